//! Cross-module tests driving the scene, scheduler and stage together

mod scenarios;
