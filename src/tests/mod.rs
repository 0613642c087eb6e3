//! Cross-module tests that drive slabs from several host threads.

mod helpers;
mod integration;
