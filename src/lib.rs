//! # Photo Sync
//!
//! Build pipeline and admin tooling for a photography portfolio. A folder of
//! source JPEGs goes in; a `manifest.json` plus resized AVIF/WebP/JPEG
//! variants come out, ready for a static site to consume.
//!
//! # Architecture
//!
//! ```text
//! photos/original/*.jpg ──sync──▶ generated/<tier>/<id>.{avif,webp,jpg}
//!        ▲                   └──▶ manifest.json ──check──▶ report
//!        │
//!        └── admin API edits tags/descriptions in place
//! ```
//!
//! The image files are the only source of truth. Tags, description and
//! capture time live in each file's embedded metadata. There is no
//! database; the manifest is a derived artifact and can always be
//! regenerated.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`identity`] | Content-hash stable IDs that survive renames and metadata edits |
//! | [`imaging`] | Decode, orient, resize and encode; [`imaging::ImageBackend`] seam |
//! | [`placeholder`] | BlurHash tokens for loading placeholders |
//! | [`derivatives`] | Per-tier variant generation and stale file cleanup |
//! | [`metadata`] | Embedded metadata engines, per-path locking, tag operations |
//! | [`manifest`] | Manifest types, tag index, ordering, atomic save |
//! | [`sync`] | Reconciles the source folder against the previous manifest |
//! | [`check`] | Validates a written manifest and the files it references |
//! | [`source_index`] | TTL-cached ID → path lookup for the admin side |
//! | [`admin`] | Admin operations as library calls |
//! | [`server`] | HTTP routes over [`admin::AdminService`] |
//! | [`shutdown`] | Signal handling and one-time engine close |
//! | [`config`] | `photo-sync.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Pixel-Hash Identity
//!
//! A photo's ID is the first 20 hex digits of the SHA-256 of its decoded
//! RGB pixels. Renaming a file or rewriting its keywords leaves the ID
//! alone, so derivatives are reused instead of re-encoded. Editing the
//! picture itself yields a new ID and fresh derivatives.
//!
//! ## Cache by ID, Refresh Metadata Always
//!
//! When a photo's ID is already in the previous manifest and its
//! derivatives exist, `sync` skips all image work but still re-reads
//! tags, description and capture time from the file. Metadata edits made
//! through the admin API therefore show up on the next sync without any
//! re-encoding.
//!
//! ## Locked Read-Modify-Write
//!
//! Every metadata write and every tag edit runs under an exclusive lock
//! for that file path. Two requests editing the same photo queue up;
//! requests for different photos run in parallel.

pub mod admin;
pub mod check;
pub mod config;
pub mod derivatives;
pub mod identity;
pub mod imaging;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod placeholder;
pub mod server;
pub mod shutdown;
pub mod source_index;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_helpers;
