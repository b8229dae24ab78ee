mod client;
mod provider;

pub use client::AwsCodeBuild;
pub use provider::CodeBuildProvider;
