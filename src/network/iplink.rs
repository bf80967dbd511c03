//! Parsing of `ip link show` and `ping` output

use thiserror::Error;

/// The raw line describing VF `vf`
pub fn vf_line(output: &str, vf: u32) -> Option<&str> {
    let prefix = format!("vf {vf} ");
    output.lines().find(|line| line.trim_start().starts_with(&prefix))
}

/// Whether the line of VF `vf` contains every needle
pub fn vf_line_contains(output: &str, vf: u32, needles: &[&str]) -> bool {
    vf_line(output, vf)
        .map(|line| needles.iter().all(|needle| line.contains(needle)))
        .unwrap_or(false)
}

/// MTU of the first link in the output
pub fn link_mtu(output: &str) -> Option<u32> {
    let mut words = output.lines().next()?.split_whitespace();
    while let Some(word) = words.next() {
        if word == "mtu" {
            return words.next()?.parse().ok();
        }
    }
    None
}

/// `ip link show <dev>` failed because the netdev left the namespace
pub fn is_missing_device(output: &str) -> bool {
    output.contains("does not exist")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfSearchError {
    #[error("failed to find the vf number that was moved into the pod")]
    NoneMoved,

    #[error("found more that one virtual function was moved from the host network namespace")]
    MultipleMoved,
}

/// Given `(vf index, missing from host)` observations, the single VF a pod took
pub fn find_moved_vf(seen: &[(u32, bool)]) -> Result<u32, VfSearchError> {
    let mut moved = seen.iter().filter(|(_, missing)| *missing).map(|(id, _)| *id);
    match (moved.next(), moved.next()) {
        (Some(id), None) => Ok(id),
        (Some(_), Some(_)) => Err(VfSearchError::MultipleMoved),
        (None, _) => Err(VfSearchError::NoneMoved),
    }
}

/// Summary line of a `ping` run
#[derive(Clone, Debug, PartialEq)]
pub struct PingSummary {
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
}

impl PingSummary {
    pub fn parse(output: &str) -> Option<Self> {
        let line = output.lines().find(|l| l.contains("packets transmitted"))?;
        let mut transmitted = None;
        let mut received = None;
        let mut loss_percent = None;

        for part in line.split(',').map(str::trim) {
            let value = part.split_whitespace().next().unwrap_or_default();
            if part.ends_with("packets transmitted") {
                transmitted = value.parse().ok();
            } else if part.ends_with("received") {
                received = value.parse().ok();
            } else if part.ends_with("packet loss") {
                loss_percent = value.trim_end_matches('%').parse().ok();
            }
        }

        Some(Self {
            transmitted: transmitted?,
            received: received?,
            loss_percent: loss_percent?,
        })
    }

    pub fn is_lossless(&self) -> bool {
        self.transmitted > 0 && self.received == self.transmitted && self.loss_percent == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PF_OUTPUT: &str = "\
6: ens1f0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP mode DEFAULT group default qlen 1000
    link/ether 3c:fd:fe:a0:2c:40 brd ff:ff:ff:ff:ff:ff
    vf 0     link/ether 00:00:00:00:00:00 brd ff:ff:ff:ff:ff:ff, spoof checking on, link-state auto, trust off
    vf 1     link/ether 8a:41:2c:3b:9e:01 brd ff:ff:ff:ff:ff:ff, vlan 1, qos 2, spoof checking off, link-state enable, trust on
    vf 2 MAC 8a:41:2c:3b:9e:02, tx rate 100 (Mbps), max_tx_rate 100Mbps, min_tx_rate 40Mbps, spoof checking on, link-state disable, trust off
";

    #[test]
    fn test_vf_line_contains() {
        assert!(vf_line_contains(PF_OUTPUT, 1, &["vlan 1", "qos 2"]));
        assert!(vf_line_contains(PF_OUTPUT, 2, &["max_tx_rate 100Mbps", "min_tx_rate 40Mbps"]));
        assert!(!vf_line_contains(PF_OUTPUT, 0, &["trust on"]));
        assert!(!vf_line_contains(PF_OUTPUT, 7, &["trust off"]));
    }

    #[test]
    fn test_vf_line_does_not_match_longer_ids() {
        let output = "    vf 10 MAC aa:bb:cc:dd:ee:ff, trust on\n";
        assert!(vf_line(output, 1).is_none());
        assert!(vf_line(output, 10).is_some());
    }

    #[test]
    fn test_link_mtu() {
        assert_eq!(link_mtu(PF_OUTPUT), Some(1500));
        let net1 = "3: net1: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000 qdisc mq state UP";
        assert_eq!(link_mtu(net1), Some(9000));
        assert_eq!(link_mtu(""), None);
    }

    #[test]
    fn test_is_missing_device() {
        assert!(is_missing_device("Device \"ens1f0v3\" does not exist.\n"));
        assert!(!is_missing_device(PF_OUTPUT));
    }

    #[test]
    fn test_find_moved_vf() {
        assert_eq!(find_moved_vf(&[(0, false), (1, false), (2, true)]), Ok(2));
        assert_eq!(
            find_moved_vf(&[(0, true), (1, true)]),
            Err(VfSearchError::MultipleMoved)
        );
        assert_eq!(
            find_moved_vf(&[(0, false), (1, false)]),
            Err(VfSearchError::NoneMoved)
        );
        assert_eq!(
            VfSearchError::NoneMoved.to_string(),
            "failed to find the vf number that was moved into the pod"
        );
    }

    #[test]
    fn test_ping_summary() {
        let output = "\
PING 10.10.10.171 (10.10.10.171) 8972(9000) bytes of data.
8980 bytes from 10.10.10.171: icmp_seq=1 ttl=64 time=0.215 ms
8980 bytes from 10.10.10.171: icmp_seq=2 ttl=64 time=0.103 ms

--- 10.10.10.171 ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
";
        let summary = PingSummary::parse(output).unwrap();
        assert_eq!(summary.transmitted, 2);
        assert_eq!(summary.received, 2);
        assert!(summary.is_lossless());
    }

    #[test]
    fn test_ping_summary_with_errors() {
        let output = "3 packets transmitted, 0 received, +3 errors, 100% packet loss, time 2046ms";
        let summary = PingSummary::parse(output).unwrap();
        assert_eq!(summary.received, 0);
        assert_eq!(summary.loss_percent, 100.0);
        assert!(!summary.is_lossless());
        assert!(PingSummary::parse("connect: Network is unreachable").is_none());
    }
}
