//! # blyncd
//!
//! A Linux daemon that drives a Blynclight USB status light from a weekly
//! schedule.
//!
//! ## Features
//!
//! - **Schedule**: weekday/time rules with overnight ranges; the last
//!   matching rule wins and a manual override beats them all
//! - **Failover**: library-backed driver, raw HID driver and a virtual light,
//!   with rescans when the device disappears
//! - **Shared settings**: `config.json` and `status.json` polled by
//!   modification time, editable while the daemon runs
//! - **Single instance**: a loopback port doubles as the lock
//!
//! ## Architecture
//!
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - service lifecycle
//! - [`EventBus`](event::EventBus) - inter-service communication
//! - [`AppState`](app_context::AppState) - shared store and device manager
//! - [`DeviceManager`](device_manager::DeviceManager) - backend failover
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blyncd::{application::Application, store::ConfigStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(ConfigStore::open("/tmp/blyncd").await?);
//!     Application::builder()
//!         .with_store(store)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod device_manager;
pub mod drivers;
pub mod event;
pub mod health;
pub mod instance;
pub mod light;
pub mod providers;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod task_manager;
