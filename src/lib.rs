//! ec2-reaper - age-based EC2 instance termination
//!
//! Scans running EC2 instances and terminates those launched before a
//! configurable cutoff, unless an immunity tag exempts them. Supports a
//! dry-run mode (the default when unconfigured) and an optional override
//! of EC2 API termination protection.
//!
//! The decision core lives in [`reaper`] and is driven entirely through
//! the [`reaper::InstanceSource`] trait, so it can be unit tested without
//! touching AWS. The [`aws`] module provides the real SDK-backed source.

pub mod aws;
pub mod classify;
pub mod config;
pub mod error;
pub mod reaper;
