//! # EAD Import
//!
//! Batch importer for archival finding aids encoded in EAD XML.
//!
//! Each file is normalized, walked depth-first into one root record and a
//! tree of component records with content-derived stable identifiers,
//! persisted in SQLite through one connection per worker, and projected
//! into search documents sent to a search index in bulk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │  EAD files │──▶│ Normalizer │──▶│ Tree walker │──▶│  SQLite  │
//! │  (paths)   │   │  xml+text  │   │ + builders  │   │  store   │
//! └────────────┘   └────────────┘   └──────┬──────┘   └──────────┘
//!       worker pool (bounded queue)        │
//!                                          ▼
//!                                   ┌─────────────┐
//!                                   │ Search index│
//!                                   │   (_bulk)   │
//!                                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! eadi init                          # create database
//! eadi import ./ead/                 # import every .xml file below ./ead
//! eadi import FRAD054_IR_1.xml --reimport
//! eadi stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Per-file failure taxonomy |
//! | [`xml`] | Arena XML tree and path queries |
//! | [`normalize`] | Namespace stripping and internal-content removal |
//! | [`text`] | Whitespace, markup and label cleanup |
//! | [`dates`] | Year ranges and search date fields |
//! | [`html`] | Descriptive sections rendered as HTML fragments |
//! | [`extract`] | Identity, descriptive text and header extractors |
//! | [`index_entries`] | Index-entry collection and deduplication |
//! | [`dao`] | Digitized-object resolution |
//! | [`reader`] | Depth-first component walk with inheritance |
//! | [`records`] | Record builder and stable identifiers |
//! | [`ids`] | SHA-256 identifiers |
//! | [`services`] | Service resolution from file names |
//! | [`authority`] | Authority references for index entries |
//! | [`models`] | Records and search documents |
//! | [`store`] | Record store trait, SQLite and in-memory backends |
//! | [`search`] | Search index trait and backends |
//! | [`publish`] | Cleaned XML republication |
//! | [`ingest`] | Single-file import |
//! | [`batch`] | Worker pool and batch summary |
//! | [`progress`] | Progress reporting on stderr |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`stats`] | `eadi stats` |
//! | [`get`] | `eadi get` |

pub mod authority;
pub mod batch;
pub mod config;
pub mod dao;
pub mod dates;
pub mod db;
pub mod error;
pub mod extract;
pub mod get;
pub mod html;
pub mod ids;
pub mod index_entries;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod publish;
pub mod reader;
pub mod records;
pub mod search;
pub mod services;
pub mod stats;
pub mod store;
pub mod text;
pub mod xml;
