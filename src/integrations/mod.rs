//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod ai {
    pub use crate::ai::*;
}
