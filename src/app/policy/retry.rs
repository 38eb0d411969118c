// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Retry policies: given a failed attempt, decide whether the execution
//! engine retries on the same host, moves to the next host of the plan,
//! swallows the error, or surfaces it.

use crate::{
    app::error::DriverError,
    cql::frame::{
        responses::error::{
            Additional,
            ErrorCode,
            WriteType,
        },
        Consistency,
    },
};

/// The verdict on a failed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry on the same host, optionally at a decorated consistency.
    Retry { consistency: Option<Consistency> },
    /// Retry on the next host of the query plan.
    RetryNextHost,
    /// Swallow the error and report an empty result.
    Ignore,
    /// Surface the error to the caller.
    Rethrow,
}

/// What the engine knows about the failed attempt.
pub struct RetryContext<'a> {
    /// The error of this attempt.
    pub error: &'a DriverError,
    /// Whether the statement can safely be applied twice.
    pub is_idempotent: bool,
    /// Retries already performed for this request.
    pub retry_count: usize,
    /// The consistency level of the request.
    pub consistency: Consistency,
}

pub trait RetryPolicy: Send + Sync {
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision;
}

/// The built-in default:
/// - read timeout: retry once on the same host when enough replicas
///   answered but the data replica did not;
/// - write timeout: retry once only for batch-log writes;
/// - unavailable: move to the next host once;
/// - transport failures: next host, but only for idempotent statements.
#[derive(Debug, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision {
        if ctx.retry_count > 0 {
            return RetryDecision::Rethrow;
        }
        match ctx.error {
            DriverError::Response(frame) => match (frame.code(), frame.additional()) {
                (ErrorCode::ReadTimeout, Some(Additional::ReadTimeout(rt))) => {
                    if rt.received >= rt.block_for && !rt.data_present {
                        RetryDecision::Retry { consistency: None }
                    } else {
                        RetryDecision::Rethrow
                    }
                }
                (ErrorCode::WriteTimeout, Some(Additional::WriteTimeout(wt))) => {
                    if wt.write_type == WriteType::BatchLog {
                        RetryDecision::Retry { consistency: None }
                    } else {
                        RetryDecision::Rethrow
                    }
                }
                (ErrorCode::Unavailable, _) => RetryDecision::RetryNextHost,
                (ErrorCode::IsBootstrapping, _) => RetryDecision::RetryNextHost,
                _ => RetryDecision::Rethrow,
            },
            DriverError::Broken(_) | DriverError::OperationTimedOut(_) | DriverError::BusyConnection(_) => {
                if ctx.is_idempotent {
                    RetryDecision::RetryNextHost
                } else {
                    RetryDecision::Rethrow
                }
            }
            _ => RetryDecision::Rethrow,
        }
    }
}

/// Never retries; every server error surfaces verbatim.
#[derive(Debug, Default)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn decide(&self, _ctx: &RetryContext<'_>) -> RetryDecision {
        RetryDecision::Rethrow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::frame::responses::error::{
        ErrorFrame,
        ReadTimeout,
        Unavailable,
        WriteTimeout,
    };

    fn ctx<'a>(error: &'a DriverError, is_idempotent: bool, retry_count: usize) -> RetryContext<'a> {
        RetryContext {
            error,
            is_idempotent,
            retry_count,
            consistency: Consistency::LocalOne,
        }
    }

    fn read_timeout(received: i32, block_for: i32, data_present: bool) -> DriverError {
        DriverError::Response(
            ErrorFrame::new(ErrorCode::ReadTimeout, "timeout").with_additional(Additional::ReadTimeout(
                ReadTimeout {
                    cl: Consistency::Quorum,
                    received,
                    block_for,
                    data_present,
                },
            )),
        )
    }

    #[test]
    fn read_timeout_retries_without_data() {
        let policy = DefaultRetryPolicy;
        let error = read_timeout(2, 2, false);
        assert_eq!(
            policy.decide(&ctx(&error, false, 0)),
            RetryDecision::Retry { consistency: None }
        );
        let error = read_timeout(2, 2, true);
        assert_eq!(policy.decide(&ctx(&error, false, 0)), RetryDecision::Rethrow);
        let error = read_timeout(1, 2, false);
        assert_eq!(policy.decide(&ctx(&error, false, 0)), RetryDecision::Rethrow);
    }

    #[test]
    fn write_timeout_retries_batch_log_only() {
        let policy = DefaultRetryPolicy;
        for (write_type, expected) in [
            (WriteType::BatchLog, RetryDecision::Retry { consistency: None }),
            (WriteType::Simple, RetryDecision::Rethrow),
            (WriteType::Batch, RetryDecision::Rethrow),
        ] {
            let error = DriverError::Response(
                ErrorFrame::new(ErrorCode::WriteTimeout, "timeout").with_additional(Additional::WriteTimeout(
                    WriteTimeout {
                        cl: Consistency::One,
                        received: 0,
                        block_for: 1,
                        write_type,
                    },
                )),
            );
            assert_eq!(policy.decide(&ctx(&error, false, 0)), expected);
        }
    }

    #[test]
    fn unavailable_moves_to_next_host() {
        let policy = DefaultRetryPolicy;
        let error = DriverError::Response(
            ErrorFrame::new(ErrorCode::Unavailable, "unavailable").with_additional(Additional::Unavailable(
                Unavailable {
                    cl: Consistency::Quorum,
                    required: 2,
                    alive: 1,
                },
            )),
        );
        assert_eq!(policy.decide(&ctx(&error, false, 0)), RetryDecision::RetryNextHost);
    }

    #[test]
    fn transport_errors_respect_idempotence() {
        let policy = DefaultRetryPolicy;
        let error = DriverError::Broken("reset".to_owned());
        assert_eq!(policy.decide(&ctx(&error, true, 0)), RetryDecision::RetryNextHost);
        assert_eq!(policy.decide(&ctx(&error, false, 0)), RetryDecision::Rethrow);
        let error = DriverError::OperationTimedOut(12_000);
        assert_eq!(policy.decide(&ctx(&error, true, 0)), RetryDecision::RetryNextHost);
    }

    #[test]
    fn only_one_policy_retry() {
        let policy = DefaultRetryPolicy;
        let error = read_timeout(2, 2, false);
        assert_eq!(policy.decide(&ctx(&error, false, 1)), RetryDecision::Rethrow);
    }

    #[test]
    fn fallthrough_never_retries() {
        let policy = FallthroughRetryPolicy;
        let error = read_timeout(2, 2, false);
        assert_eq!(policy.decide(&ctx(&error, true, 0)), RetryDecision::Rethrow);
    }
}
