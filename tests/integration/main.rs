//! End-to-end tests: real SQLite store and engine, in-memory chain and
//! wallet services.

mod mock_services;
mod settlement;
