//! The immutable find query.

use crate::finder::is_pattern;

/// A pattern plus an optional time window. Each dot-delimited segment of the
/// pattern is a glob expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub pattern: String,
    pub start_time: Option<u32>,
    pub end_time: Option<u32>,
}

impl Query {
    pub fn new(pattern: String, start_time: Option<u32>, end_time: Option<u32>) -> Self {
        Query {
            pattern,
            start_time,
            end_time,
        }
    }

    /// True when no segment carries a wildcard, making the query eligible
    /// for a find-first-match short-circuit.
    pub fn is_exact(&self) -> bool {
        !is_pattern(&self.pattern)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_bound = |b: Option<u32>| match b {
            Some(t) => t.to_string(),
            None => "*".to_string(),
        };
        write!(
            f,
            "<Query: {} from {} until {}>",
            self.pattern,
            fmt_bound(self.start_time),
            fmt_bound(self.end_time)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exact() {
        assert!(Query::new("servers.web01.cpu".to_string(), None, None).is_exact());
        assert!(!Query::new("servers.web*.cpu".to_string(), None, None).is_exact());
        assert!(!Query::new("servers.web0?.cpu".to_string(), None, None).is_exact());
        assert!(!Query::new("servers.web[12].cpu".to_string(), None, None).is_exact());
    }

    #[test]
    fn test_display() {
        let q = Query::new("a.b".to_string(), Some(100), None);
        assert_eq!(q.to_string(), "<Query: a.b from 100 until *>");
    }
}
