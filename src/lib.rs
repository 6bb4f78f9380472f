// PromptCut Library Root
// Copyright (c) 2026 Xing_The_Creator | PromptCut

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod views;
