// ABOUTME: Filesystem-only source control provider for sourcebus
// ABOUTME: Used when no version control backend is configured for the workspace

mod fs_ops;
mod path_queue;
mod provider;

#[cfg(test)]
mod tests;

pub use provider::{LocalFileProvider, WORKSPACE_ROOT_KEY};
