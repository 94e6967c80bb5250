// Domain-layer modules and shared errors/models
pub mod enrichment {
    pub use crate::enrichment::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod normalizers {
    pub use crate::cnes::*;
    pub use crate::cnpj::*;
}

pub mod segmentation {
    pub use crate::segmentation::*;
}

pub mod errors {
    pub use crate::errors::*;
}
