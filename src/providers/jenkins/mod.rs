mod client;
mod provider;

pub use client::JenkinsClient;
pub use provider::JenkinsProvider;
