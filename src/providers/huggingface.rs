//! An umbrella module for the Hugging Face inference provider

mod api;
mod provider;

pub(crate) use self::api::DEFAULT_API_BASE;
pub(crate) use self::provider::{HuggingFaceProvider, DEFAULT_MODEL};
