//! Per-client token bucket guarding the AI image search.

use std::{
	net::IpAddr,
	time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// How often idle buckets are dropped from the limiter.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
	Allowed { remaining: u32 },
	Denied { remaining: u32, reset: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
	tokens: f64,
	updated: Instant,
}

pub struct RateLimiter {
	capacity: f64,
	refill_per_sec: f64,
	buckets: DashMap<IpAddr, Bucket>,
}

impl RateLimiter {
	pub fn new(config: RateLimitConfig) -> Self {
		let interval = config.interval.as_secs_f64().max(f64::EPSILON);
		Self {
			capacity: f64::from(config.capacity.max(1)),
			refill_per_sec: f64::from(config.refill) / interval,
			buckets: DashMap::new(),
		}
	}

	pub fn check(&self, ip: IpAddr, cost: u32) -> Decision {
		self.check_at(ip, cost, Instant::now())
	}

	/// Takes `cost` tokens from the client's bucket if it holds enough.
	pub fn check_at(&self, ip: IpAddr, cost: u32, now: Instant) -> Decision {
		let cost = f64::from(cost);
		let mut bucket = self.buckets.entry(ip).or_insert(Bucket {
			tokens: self.capacity,
			updated: now,
		});

		let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
		bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
		bucket.updated = now;

		if bucket.tokens >= cost {
			bucket.tokens -= cost;
			return Decision::Allowed {
				remaining: bucket.tokens.floor() as u32,
			};
		}

		let missing = cost - bucket.tokens;
		let reset = if self.refill_per_sec > 0.0 {
			Duration::from_secs_f64(missing / self.refill_per_sec)
		} else {
			Duration::MAX
		};
		Decision::Denied {
			remaining: bucket.tokens.floor() as u32,
			reset,
		}
	}

	pub fn evict_idle(&self) -> usize {
		self.evict_idle_at(Instant::now())
	}

	/// Drops buckets that have refilled to capacity; a fresh bucket behaves the same.
	pub fn evict_idle_at(&self, now: Instant) -> usize {
		let before = self.buckets.len();
		self.buckets.retain(|_, bucket| {
			let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
			bucket.tokens + elapsed * self.refill_per_sec < self.capacity
		});
		before.saturating_sub(self.buckets.len())
	}

	pub fn tracked_clients(&self) -> usize {
		self.buckets.len()
	}
}
