use super::{Indicator, Scanner};
use crate::detection::{Evidence, EvidenceCategory};
use crate::runtime::Target;
use crate::stack::Framework;
use async_trait::async_trait;
use std::collections::BTreeSet;

const PORT_WEIGHT: f64 = 0.3;

/// Conventional development-server ports. Any service can reuse these, hence the
/// low weight.
const PORT_TABLE: &[(u16, Framework)] = &[
    (5000, Framework::Flask),
    (8000, Framework::Django),
    (8080, Framework::SpringBoot),
    (3000, Framework::Express),
    (4000, Framework::Express),
];

#[derive(Debug, Default)]
pub struct PortScanner;

#[async_trait]
impl Scanner for PortScanner {
    fn category(&self) -> EvidenceCategory {
        EvidenceCategory::Port
    }

    async fn try_scan(&self, target: &Target) -> anyhow::Result<Evidence> {
        let mut evidence = Evidence::new();
        let ports: BTreeSet<u16> = target
            .info()
            .ports
            .iter()
            .map(|p| p.container_port)
            .collect();

        for port in ports {
            if let Some((_, framework)) = PORT_TABLE.iter().find(|(p, _)| *p == port) {
                evidence.add(*framework, PORT_WEIGHT);
            }
        }
        Ok(evidence)
    }

    fn indicators(&self) -> Vec<Indicator> {
        PORT_TABLE
            .iter()
            .map(|(port, fw)| Indicator::new(self.category(), *fw, port.to_string(), PORT_WEIGHT))
            .collect()
    }
}
