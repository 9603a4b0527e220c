// Library root
// -----------
// This crate exposes the library surface behind the `storefront-publisher`
// binary.
//
// Module responsibilities:
// - `upload`: sliced, concurrent upload of large unitypackages. This is the
//   part with real moving pieces (planning, staging, worker pool).
// - `api`: HTTP interactions with the storefront (auth, packages, versions,
//   slice transport).
// - `auth`: login, publishing-key storage and API-key signing.
// - `descriptor` / `publish`: package descriptor files and the save/submit
//   workflows built on top of `api`.
// - `config` / `workspace`: per-invocation settings and on-disk layout.
// - `cli` / `ui`: argument parsing, prompts and progress output.
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod publish;
pub mod ui;
pub mod upload;
pub mod workspace;
