//! # Lending Protocol Indexer
//!
//! Off-chain mirror of an on-chain lending protocol, built on
//! [Alloy](https://github.com/alloy-rs/alloy).
//!
//! The indexer subscribes to the protocol contract's event stream over
//! WebSocket and mirrors pools, loans, and allow-listed tokens into a local
//! SQLite store, applying each event idempotently. A REST API exposes the
//! mirrored state.
//!
//! ## Features
//!
//! - **Type-safe event decoding** using Alloy's `sol!` macro
//! - **Read-through resolution**: id-only events are completed with
//!   contract reads against current chain state
//! - **Per-entity serialization**: keyed async mutexes prevent lost updates
//!   on a pool's loan membership
//! - **Failure isolation**: one bad event is logged and dropped, the stream
//!   moves on
//! - **Production error handling** with a unified `IndexerError`
//! - **Full async/await** support with Tokio
//!
//! ## Architecture
//!
//! The crate is organized into independent layers:
//!
//! 1. **Config Layer** ([`config`]) - Environment variable loading
//! 2. **RPC Layer** ([`rpc`]) - Node connection management
//! 3. **Events Layer** ([`events`], [`normalize`]) - Event decoding and
//!    normalization
//! 4. **Resolver** ([`resolver`]) - Read-through contract queries
//! 5. **Reconciler** ([`reconcile`], [`locks`]) - Idempotent state mirror
//! 6. **Supervisor** ([`supervisor`], [`router`]) - Stream lifecycle and
//!    dispatch
//! 7. **Storage** ([`db`]) - SQLite store with migrations
//! 8. **API** ([`api`]) - REST surface over the mirrored state
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the full service
//! cargo run --release -- serve
//!
//! # Verify the environment
//! cargo run --release -- check
//! ```
//!
//! ## Environment Setup
//!
//! Create a `.env` file with the node endpoints and contract address:
//!
//! ```text
//! RPC_WS_URL=wss://eth-mainnet.g.alchemy.com/v2/YOUR_KEY
//! RPC_HTTP_URL=https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY
//! PROTOCOL_ADDRESS=0x...
//! ```
//!
//! Without these the process starts in degraded mode and serves the REST
//! API over the existing store only.
//!
//! ## Error Handling
//!
//! All operations return [`error::IndexerResult<T>`](error::IndexerResult)
//! for consistent error propagation:
//!
//! ```rust
//! use lending_indexer::error::{IndexerError, IndexerResult};
//!
//! fn example() -> IndexerResult<()> {
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod app_state;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod locks;
pub mod normalize;
pub mod observability;
pub mod reconcile;
pub mod resolver;
pub mod router;
pub mod rpc;
pub mod supervisor;
