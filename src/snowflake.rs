use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Planetgate epoch: 2024-01-01T00:00:00Z
const EPOCH: u64 = 1_704_067_200_000;

const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_SHIFT: u32 = 22;

/// Last issued `(elapsed_ms << SEQUENCE_BITS) | sequence`, advanced as one
/// value so two threads can never claim the same pair.
static STATE: AtomicU64 = AtomicU64::new(0);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH)
}

fn elapsed_ms() -> u64 {
    now_ms().saturating_sub(EPOCH)
}

/// Time-ordered 63-bit id for planets, roles, channels and members.
///
/// Ids stay positive so they fit the signed `INTEGER` columns as-is. A
/// clock that steps backwards keeps counting from the last issued
/// millisecond.
pub fn generate() -> i64 {
    loop {
        let prev = STATE.load(Ordering::Acquire);
        let last = prev >> SEQUENCE_BITS;
        let now = elapsed_ms();

        let next = if now > last {
            now << SEQUENCE_BITS
        } else if prev & SEQUENCE_MASK < SEQUENCE_MASK {
            prev + 1
        } else {
            // Sequence exhausted, wait for the next millisecond.
            std::hint::spin_loop();
            continue;
        };

        if STATE
            .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let timestamp = next >> SEQUENCE_BITS;
            let id = (timestamp << TIMESTAMP_SHIFT) | (next & SEQUENCE_MASK);
            return (id & i64::MAX as u64) as i64;
        }
    }
}
