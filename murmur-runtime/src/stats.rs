//! Token-rate reporting

use std::fmt;
use std::time::Duration;

/// Throughput summary for one finished generation turn.
///
/// Formats as `(12 token, time=0.34s, 28.33ms per token)`.
#[derive(Debug, Clone, Copy)]
pub struct TokenRateReport {
    generated: usize,
    elapsed: Duration,
}

impl TokenRateReport {
    #[must_use]
    pub fn new(generated: usize, elapsed: Duration) -> Self {
        Self { generated, elapsed }
    }

    /// Tokens generated this turn.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.generated
    }

    /// Milliseconds spent per generated token.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ms_per_token(&self) -> f64 {
        if self.generated == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() * 1000.0 / self.generated as f64
    }
}

impl fmt::Display for TokenRateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} token, time={:.2}s, {:.2}ms per token)",
            self.generated,
            self.elapsed.as_secs_f64(),
            self.ms_per_token()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let report = TokenRateReport::new(4, Duration::from_millis(200));
        assert_eq!(report.to_string(), "(4 token, time=0.20s, 50.00ms per token)");
        assert!((report.ms_per_token() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tokens() {
        let report = TokenRateReport::new(0, Duration::from_millis(100));
        assert_eq!(report.ms_per_token(), 0.0);
    }
}
