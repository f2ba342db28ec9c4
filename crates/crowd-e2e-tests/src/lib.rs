//! End-to-end integration tests for the crowd safety pipeline.
//!
//! These tests exercise the full stack:
//! - Readings through the density monitor into the alert engine
//! - Multi-channel delivery and the retry queue
//! - Emergency escalation across adjacent areas
//! - Operator acknowledgment and resolution
//! - The persisted audit journal and history queries

#![cfg(test)]
