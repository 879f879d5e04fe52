// Orchestrator tests driven by in-memory collaborators

pub(crate) mod fakes;
mod orchestrator_tests;
