//! CSV and JSON export of result tables.

use std::io::Write;

use crate::error::KnowMeError;
use crate::types::{ResultRow, ServiceKind};

/// Default export file name for a service, e.g. `resultados_deudores.csv`.
pub fn default_export_name(kind: ServiceKind) -> String {
    format!("resultados_{}.csv", kind.name())
}

/// Write a header line followed by one line per row.
pub fn write_csv<R, W>(rows: &[R], mut writer: W) -> Result<(), KnowMeError>
where
    R: ResultRow,
    W: Write,
{
    writeln!(writer, "{}", join_csv(R::columns().iter().copied()))?;
    for row in rows {
        let values = row.values();
        writeln!(writer, "{}", join_csv(values.iter().map(String::as_str)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Render rows as a CSV document.
pub fn to_csv_string<R: ResultRow>(rows: &[R]) -> Result<String, KnowMeError> {
    let mut buffer = Vec::new();
    write_csv(rows, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| KnowMeError::internal(e.to_string()))
}

/// Render rows as a pretty-printed JSON array.
pub fn to_json_string<R: ResultRow>(rows: &[R]) -> Result<String, KnowMeError> {
    Ok(serde_json::to_string_pretty(rows)?)
}

fn join_csv<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    fields.map(escape_csv_field).collect::<Vec<_>>().join(",")
}

/// Quote a field when it contains a delimiter, quote or line break.
fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DebtorRecord, DebtorStatus, ValidityRecord, Vigencia};
    use serde_json::json;

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field("plain"), "plain");
        assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_validity_csv() {
        let rows = vec![
            ValidityRecord {
                documento: "1".to_string(),
                vigencia: Vigencia::Reported("Si".to_string()),
            },
            ValidityRecord::failed("2".to_string()),
        ];
        assert_eq!(
            to_csv_string(&rows).unwrap(),
            "Documento,Vigencia\n1,Si\n2,Error\n"
        );
    }

    #[test]
    fn test_debtor_csv_with_absent_sanction() {
        let rows = vec![
            DebtorRecord {
                documento: "9".to_string(),
                sancionado: Some(json!("Multa, grave")),
                estado: DebtorStatus::Moroso,
            },
            DebtorRecord {
                documento: "10".to_string(),
                sancionado: None,
                estado: DebtorStatus::NoMoroso,
            },
        ];
        assert_eq!(
            to_csv_string(&rows).unwrap(),
            "Documento,Sancionado,Estado\n9,\"Multa, grave\",Moroso\n10,,No moroso\n"
        );
    }

    #[test]
    fn test_json_export() {
        let rows = vec![ValidityRecord {
            documento: "5".to_string(),
            vigencia: Vigencia::NoDisponible,
        }];
        let parsed: serde_json::Value = serde_json::from_str(&to_json_string(&rows).unwrap()).unwrap();
        assert_eq!(parsed, json!([{"Documento": "5", "Vigencia": "No disponible"}]));
    }

    #[test]
    fn test_default_export_name() {
        assert_eq!(
            default_export_name(ServiceKind::Defunciones),
            "resultados_defunciones.csv"
        );
    }
}
