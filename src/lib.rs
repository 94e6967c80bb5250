//! Health Sales AI Library
//!
//! Prospecting backend for health-sector sales: CNPJ enrichment from
//! BrasilAPI and DataSUS CNES, prospect storage, and LLM-generated
//! briefings, interaction analysis and outreach drafts.
//!
//! # Modules
//!
//! - `api`: HTTP route table and handlers.
//! - `core`: Enrichment pipeline, normalizers, models and errors.
//! - `data`: Database access and response caching.
//! - `integrations`: BrasilAPI, CNES and LLM clients.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

pub mod ai;
pub mod cache_validator;
pub mod cnes;
pub mod cnpj;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod llm_client;
pub mod models;
pub mod segmentation;
pub mod services;
