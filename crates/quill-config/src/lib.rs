// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod schema;

pub use loader::{
    load_project_config, load_user_config, save_project_config, save_user_config,
    user_config_path,
};
pub use schema::{EngineConfig, ProjectConfig, UserConfig};
