// tests/tokenbucket/admission_tests.rs

#[cfg(test)]
mod tests {
    use crate::TestClock;
    use credit_bucket::{TokenBucket, TokenBucketConfig, TokenBucketError};
    use std::time::Duration;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn bucket(config: TokenBucketConfig, clock: &TestClock) -> TokenBucket<&'static str, TestClock> {
        TokenBucket::with_config(config, clock.clone()).unwrap()
    }

    #[test]
    fn full_bucket_grants_immediately() {
        let clock = TestClock::new(0.0);
        let bucket = bucket(TokenBucketConfig::new(3.0, 1.0), &clock);

        let grant = bucket.request_token(None).unwrap();
        assert!(grant.is_immediate());
        assert_eq!(grant.delay(), Duration::ZERO);
        assert_eq!(bucket.balance().unwrap(), 2.0);
    }

    #[tokio::test]
    async fn burst_credit_and_rejection() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(10.0, 10.0).token_credit(10.0);
        let bucket = bucket(config, &clock);

        let mut grants = Vec::new();
        let mut rejected = 0;
        for _ in 0..30 {
            match bucket.request_token(None) {
                Ok(grant) => grants.push(grant),
                Err(TokenBucketError::CreditExceeded) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(grants.len(), 20);
        assert_eq!(rejected, 10);
        assert!(grants[..10].iter().all(|grant| grant.is_immediate()));
        for (i, grant) in grants[10..].iter().enumerate() {
            assert!(!grant.is_immediate());
            assert_close(grant.delay().as_secs_f64(), 0.1 * (i + 1) as f64);
        }
        assert_eq!(bucket.pending(), 10);
        assert_eq!(bucket.balance().unwrap(), -10.0);
    }

    #[tokio::test]
    async fn over_credit_rejects_synchronously() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(2.0, 10.0).token_credit(2.0);
        let bucket = bucket(config, &clock);

        assert!(bucket.request_token(None).unwrap().is_immediate());
        assert!(bucket.request_token(None).unwrap().is_immediate());
        let third = bucket.request_token(None).unwrap();
        let fourth = bucket.request_token(None).unwrap();
        assert!(!third.is_immediate());
        assert!(!fourth.is_immediate());

        assert_eq!(
            bucket.request_token(None).unwrap_err(),
            TokenBucketError::CreditExceeded
        );
        // the rejected request was not charged
        assert_eq!(bucket.balance().unwrap(), -2.0);
    }

    #[tokio::test]
    async fn depleted_start_defers_by_two_tokens() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(10.0, 10.0).initial_balance(-1.0);
        let bucket = bucket(config, &clock);

        let grant = bucket.request_token(None).unwrap();
        assert_close(grant.delay().as_secs_f64() * 1000.0, 200.0);
        assert_close(bucket.balance().unwrap(), -2.0);
    }

    #[test]
    fn requests_without_elapsed_time_count_down_exactly() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(5.0, 1.0).initial_balance(12.0);
        let bucket = bucket(config, &clock);

        for _ in 0..12 {
            assert!(bucket.request_token(None).unwrap().is_immediate());
        }
        assert_eq!(bucket.balance().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn elapsed_time_refills_up_to_capacity() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(4.0, 2.0).token_credit(4.0);
        let bucket = bucket(config, &clock);

        for _ in 0..6 {
            let _ = bucket.request_token(None).unwrap();
        }
        assert_eq!(bucket.balance().unwrap(), -2.0);

        clock.advance(1.5);
        assert_close(bucket.balance().unwrap(), 1.0);
        assert!(bucket.request_token(None).unwrap().is_immediate());

        clock.advance(60.0);
        assert_eq!(bucket.balance().unwrap(), 4.0);
    }

    #[tokio::test]
    async fn partial_refill_shortens_the_delay() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(1.0, 4.0).token_credit(5.0);
        let bucket = bucket(config, &clock);

        assert!(bucket.request_token(None).unwrap().is_immediate());
        clock.advance(0.125);

        // half a token accrued, half a token missing
        let grant = bucket.request_token(None).unwrap();
        assert_close(grant.delay().as_secs_f64(), 0.125);
        assert_close(bucket.balance().unwrap(), -0.5);
    }

    #[test]
    fn overfilled_bucket_is_not_clamped() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(2.0, 1.0).initial_balance(6.0);
        let bucket = bucket(config, &clock);

        clock.advance(30.0);
        assert_eq!(bucket.balance().unwrap(), 6.0);
        assert!(bucket.request_token(None).unwrap().is_immediate());
        assert_eq!(bucket.balance().unwrap(), 5.0);
    }

    #[tokio::test]
    async fn clock_regression_never_goes_below_credit_floor() {
        let clock = TestClock::new(1_000.0);
        let config = TokenBucketConfig::new(3.0, 10.0).token_credit(3.0);
        let bucket = bucket(config, &clock);

        for _ in 0..4 {
            let _ = bucket.request_token(None).unwrap();
        }
        assert_eq!(bucket.balance().unwrap(), -1.0);

        // wall clock jumps back by ten minutes
        clock.set_time(400.0);
        assert_eq!(bucket.balance().unwrap(), -3.0);

        // already at the limit, so nothing more can be deferred
        assert_eq!(
            bucket.request_token(None).unwrap_err(),
            TokenBucketError::CreditExceeded
        );

        // and accrual resumes from the regressed reading
        clock.advance(0.5);
        assert_close(bucket.balance().unwrap(), 2.0);
        assert!(bucket.request_token(None).unwrap().is_immediate());
    }

    #[test]
    fn zero_credit_never_defers() {
        let clock = TestClock::new(0.0);
        let config = TokenBucketConfig::new(1.0, 1.0).token_credit(0.0);
        let bucket = bucket(config, &clock);

        assert!(bucket.request_token(None).unwrap().is_immediate());
        assert_eq!(
            bucket.request_token(None).unwrap_err(),
            TokenBucketError::CreditExceeded
        );
        assert_eq!(bucket.pending(), 0);
    }
}
