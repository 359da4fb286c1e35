// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The tool runtime: the named tools the model can call, dispatched through
//! a single choke point that owns argument parsing and the mutation gate.

pub mod builtin;
mod plan;
mod registry;
mod runtime;
mod tool;

pub use plan::{PlanState, TodoItem, TodoStatus};
pub use registry::{default_registry, parse_arguments, ToolRegistry, ToolSchema};
pub use runtime::{
    apply_file_update, delete_path_via_shell, instruction_implies_write, ToolRuntime,
    JFDI_REQUIRED_MESSAGE,
};
pub use tool::{Tool, ToolReply};
