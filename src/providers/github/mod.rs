mod client;
mod provider;

pub use client::{GitHubClient, DEFAULT_API_URL};
pub use provider::{GitHubProvider, DEFAULT_REF, DEFAULT_WORKFLOW};
