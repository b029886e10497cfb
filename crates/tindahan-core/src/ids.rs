//! Identifier generation for queued mutations and optimistic records.
//!
//! ```text
//! queue id:  sale_1718000000000_k3j9x0a2b
//! temp id:   temp_1718000000000_0zq8m1c4d
//!            └─┬─┘ └─────┬─────┘ └───┬───┘
//!            prefix  unix millis   9 random base36
//! ```
//!
//! Two ids minted in the same millisecond still differ through the random
//! suffix (36^9 combinations).

use chrono::Utc;
use rand::Rng;

use crate::types::EntityType;
use crate::TEMP_ID_PREFIX;

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Generates a durable queue id: `<entity>_<millis>_<random>`.
pub fn generate_queue_id(entity_type: EntityType) -> String {
    format!(
        "{}_{}_{}",
        entity_type.as_str(),
        Utc::now().timestamp_millis(),
        random_suffix()
    )
}

/// Generates a temporary record id: `temp_<millis>_<random>`.
pub fn generate_temp_id() -> String {
    format!(
        "{}{}_{}",
        TEMP_ID_PREFIX,
        Utc::now().timestamp_millis(),
        random_suffix()
    )
}

/// Returns true for ids produced by [`generate_temp_id`].
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}
