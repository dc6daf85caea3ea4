//! # devassist
//!
//! Workspace-bounded code intelligence for AI assistants.
//!
//! Everything is scoped to one workspace root: paths are resolved through a
//! sandbox, external tools run from the root, and the semantic index lives
//! under a hidden directory inside it.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────┐      ┌──────────┐
//!                 │    CLI    │      │   HTTP   │
//!                 │(devassist)│      │ (tools)  │
//!                 └─────┬─────┘      └────┬─────┘
//!                       └───────┬─────────┘
//!                               ▼
//!                        ┌─────────────┐
//!                        │  Workspace  │
//!                        └──────┬──────┘
//!      ┌──────────┬─────────────┼─────────────┬──────────────┐
//!      ▼          ▼             ▼             ▼              ▼
//!  Sandbox    Crawler      Keyword       IndexManager   TestRunner /
//!  + files    (imports)    search        (SQLite+emb)   StaticAnalyzer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! devassist --workspace . context --summary
//! devassist --workspace . search "def main" --pattern "*.py"
//! devassist --workspace . test tests/ --framework pytest
//! devassist --workspace . serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy and machine codes |
//! | [`models`] | Result types |
//! | [`sandbox`] | Workspace path containment |
//! | [`files`] | Directory listing and file reading |
//! | [`analysis`] | Line-pattern source hints |
//! | [`crawler`] | Project files, folders and imports |
//! | [`keyword`] | Keyword search with context |
//! | [`index`] | Semantic index lifecycle |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat completion provider |
//! | [`test_runner`] | Test execution orchestrator |
//! | [`static_analysis`] | Lint and type-check runner |
//! | [`tools`] | Tool registry |
//! | [`server`] | HTTP tool server |
//! | [`workspace`] | One workspace, fully wired |

pub mod analysis;
pub mod chunk;
pub mod config;
pub mod crawler;
pub mod db;
pub mod embedding;
pub mod error;
pub mod files;
pub mod index;
pub mod keyword;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod process;
pub mod sandbox;
pub mod scan;
pub mod server;
pub mod static_analysis;
pub mod test_report;
pub mod test_runner;
pub mod tools;
pub mod workspace;
