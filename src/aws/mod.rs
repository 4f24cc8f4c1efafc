//! AWS adapter for the reaper core
//!
//! This module provides:
//! - context: shared SDK config loading
//! - ec2: the real `InstanceSource` backed by the EC2 API
//! - error: typed classification of AWS SDK errors

pub mod context;
pub mod ec2;
pub mod error;

pub use context::AwsContext;
pub use ec2::Ec2Client;
pub use error::{classify_anyhow_error, classify_aws_error, AwsError};
