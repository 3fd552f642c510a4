use crate::domain::dispatch::DispatchReport;
use crate::domain::participant::RosterSnapshot;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    giver: &'a str,
    giver_name: &'a str,
    status: String,
    attempts: u32,
    error: String,
}

/// Writes a dispatch report as CSV, one row per giver in identifier order.
///
/// The recipient is deliberately absent so the output can be shown to the
/// organizer without spoiling the draw.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_report(&mut self, report: &DispatchReport, roster: &RosterSnapshot) -> Result<()> {
        for outcome in report.outcomes() {
            let giver_name = roster
                .get(&outcome.giver)
                .map(|p| p.name.as_str())
                .unwrap_or_default();
            self.writer.serialize(ReportRow {
                giver: outcome.giver.as_str(),
                giver_name,
                status: outcome.status.to_string(),
                attempts: outcome.attempts,
                error: outcome
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dispatch::{DispatchOutcome, TransportError};
    use crate::domain::participant::Participant;

    #[test]
    fn test_write_report_sorted_without_recipients() {
        let roster = RosterSnapshot::new(vec![
            Participant::new("a", "Ana", "ana@example.com", "en"),
            Participant::new("b", "Ben", "ben@example.com", "en"),
        ])
        .unwrap();
        let mut report = DispatchReport::new();
        report.record(DispatchOutcome::failed(
            "b".into(),
            "a".into(),
            1,
            TransportError::permanent("invalid recipient address"),
        ));
        report.record(DispatchOutcome::delivered("a".into(), "b".into(), 2));

        let mut out = Vec::new();
        ReportWriter::new(&mut out)
            .write_report(&report, &roster)
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "giver,giver_name,status,attempts,error\n\
             a,Ana,delivered,2,\n\
             b,Ben,failed,1,permanent transport error: invalid recipient address\n"
        );
    }
}
