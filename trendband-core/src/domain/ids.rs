use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Order ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic order ID source with a fixed prefix ("ord-1", "ord-2", ...).
#[derive(Debug)]
pub struct OrderIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> OrderId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        OrderId(format!("{}-{}", self.prefix, n))
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new("ord")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_are_sequential() {
        let ids = OrderIdGenerator::new("paper");
        assert_eq!(ids.next_id(), OrderId::new("paper-1"));
        assert_eq!(ids.next_id(), OrderId::new("paper-2"));
    }

    #[test]
    fn order_id_display() {
        assert_eq!(OrderId::new("ord-7").to_string(), "ord-7");
    }
}
