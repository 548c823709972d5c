//! Outbound webhook delivery.
//!
//! Matches events against team subscriptions, delivers signed JSON
//! envelopes over HTTP with bounded timeouts, audits every attempt, and
//! disables subscriptions after sustained failure via a recency-window
//! circuit breaker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod presenters;
pub mod processor;
pub mod store;
pub mod task;

pub use client::{ClientConfig, HttpTransport, WebhookClient, WebhookRequest, WebhookResponse};
pub use error::DeliveryError;
pub use processor::WebhookProcessor;
pub use store::{DeliveryStore, PostgresDeliveryStore};
pub use task::{DeliverWebhookProps, DeliverWebhookTask, DISABLE_AFTER_CONSECUTIVE_FAILURES};
