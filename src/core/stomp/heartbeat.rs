use std::time::Duration;

/// A `heart-beat` header value: `outgoing,incoming` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self { outgoing_ms, incoming_ms }
    }

    /// Missing or unparsable headers mean "no heart-beating"
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let mut parts = value.split(',').map(|p| p.trim().parse::<u64>().unwrap_or(0));
        Self {
            outgoing_ms: parts.next().unwrap_or(0),
            incoming_ms: parts.next().unwrap_or(0),
        }
    }

    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Combine our offer with the server's CONNECTED header
    pub fn negotiate(&self, server: HeartBeat) -> Negotiated {
        let send_every = if self.outgoing_ms > 0 && server.incoming_ms > 0 {
            Some(Duration::from_millis(self.outgoing_ms.max(server.incoming_ms)))
        } else {
            None
        };
        let expect_within = if self.incoming_ms > 0 && server.outgoing_ms > 0 {
            Some(Duration::from_millis(self.incoming_ms.max(server.outgoing_ms)))
        } else {
            None
        };
        Negotiated {
            send_every,
            expect_within,
        }
    }
}

/// Agreed heart-beat schedule for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Negotiated {
    /// How often we must write something
    pub send_every: Option<Duration>,
    /// How often the server promised to write something
    pub expect_within: Option<Duration>,
}

impl Negotiated {
    /// Silence longer than this means the link is dead
    pub fn read_timeout(&self, tolerance: f64) -> Option<Duration> {
        self.expect_within
            .map(|d| d.mul_f64(tolerance.max(1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(HeartBeat::parse(Some("4000,10000")), HeartBeat::new(4000, 10000));
        assert_eq!(HeartBeat::parse(Some(" 0 , 5 ")), HeartBeat::new(0, 5));
        assert_eq!(HeartBeat::parse(Some("garbage")), HeartBeat::new(0, 0));
        assert_eq!(HeartBeat::parse(None), HeartBeat::default());
    }

    #[test]
    fn test_negotiate_takes_larger_interval() {
        let ours = HeartBeat::new(4000, 4000);
        let agreed = ours.negotiate(HeartBeat::new(10000, 2000));
        assert_eq!(agreed.send_every, Some(Duration::from_millis(4000)));
        assert_eq!(agreed.expect_within, Some(Duration::from_millis(10000)));
    }

    #[test]
    fn test_zero_disables_direction() {
        let ours = HeartBeat::new(4000, 4000);
        let agreed = ours.negotiate(HeartBeat::new(0, 4000));
        assert!(agreed.send_every.is_some());
        assert!(agreed.expect_within.is_none());
        assert!(agreed.read_timeout(2.0).is_none());
    }

    #[test]
    fn test_read_timeout_applies_tolerance() {
        let agreed = HeartBeat::new(4000, 4000).negotiate(HeartBeat::new(4000, 4000));
        assert_eq!(agreed.read_timeout(2.0), Some(Duration::from_millis(8000)));
        assert_eq!(agreed.read_timeout(0.5), Some(Duration::from_millis(4000)));
    }
}
