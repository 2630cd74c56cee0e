#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(
    // Trait + impl naming naturally repeats (Store, SqliteStore, InMemoryStore).
    clippy::module_name_repetitions,

    // Centroid math and bias percentages move constantly between f32/f64/usize.
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,

    // anyhow::Context messages already describe the failure at each call site.
    clippy::missing_errors_doc,

    // Mutex-poisoning panics are defensive, not part of normal control flow.
    clippy::missing_panics_doc,

    // BIO, NER, LLM, JSON are domain vocabulary, not prose needing backticks.
    clippy::doc_markdown,

    // Component constructors take Arc<Config> etc. by value; cloning the Arc is the point.
    clippy::needless_pass_by_value,

    clippy::must_use_candidate
)]

pub mod app;
pub(crate) mod api;
pub mod clients;
pub mod config;
pub mod observability;
pub mod pipeline;
pub(crate) mod schema;
pub mod store;
pub(crate) mod util;
