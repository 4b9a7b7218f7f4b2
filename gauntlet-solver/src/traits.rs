use async_trait::async_trait;
use gauntlet_common::{Result, SolveRequest, SolveResponse};

/// External challenge-solving capability.
///
/// Implementations may take tens of seconds per solve; callers bound the
/// wait with their own timeout.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solve the described challenge and return the proof token.
    async fn solve(&self, request: &SolveRequest) -> Result<SolveResponse>;

    /// Remaining account balance, for precondition checks before spending
    /// quota.
    async fn balance(&self) -> Result<f64>;
}
