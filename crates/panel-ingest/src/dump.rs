//! Tab-separated panel dump reader
//!
//! A dump directory holds one file per panel. Normal panel files carry one
//! row per feature:
//!
//! ```text
//! name  panel_id  version  signed_off  gene  symbol  [hgnc_id]
//! name  panel_id  version  signed_off  str   name  gene  seq  nb_normal  nb_patho  chrom  grch37  grch38
//! name  panel_id  version  signed_off  cnv   name  type  chrom  grch37  grch38
//! ```
//!
//! Files whose name contains `superpanel` carry one row per subpanel:
//!
//! ```text
//! panel_id  name  version  signed_off  subpanel_id  subpanel_name  subpanel_version
//! ```

use crate::records::{
    CnvRecord, DumpRecord, Feature, GeneRecord, Interval, PanelHeader, PanelRecord, PanelType,
    RecordOrigin, StrRecord, SuperpanelRecord,
};
use csv::{ReaderBuilder, StringRecord};
use panel_common::Result;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const PANEL_HEADER_FIELDS: usize = 5;
const GENE_FIELDS: usize = 6;
const STR_FIELDS: usize = 13;
const CNV_FIELDS: usize = 10;
const SUPERPANEL_FIELDS: usize = 7;

/// Read every file of a dump directory, in sorted file-name order
pub fn read_dump_dir(dir: impl AsRef<Path>, panel_type: PanelType) -> Result<Vec<DumpRecord>> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut records = Vec::new();
    for path in &paths {
        records.extend(read_dump_file(path, panel_type)?);
    }

    info!(
        dir = %dir.display(),
        panel_type = %panel_type,
        files = paths.len(),
        records = records.len(),
        "Read panel dump"
    );
    Ok(records)
}

/// Read a single dump file; the file name decides the row shape
pub fn read_dump_file(path: &Path, panel_type: PanelType) -> Result<Vec<DumpRecord>> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let superpanel = file_name.contains("superpanel");
    let file = std::fs::File::open(path)?;
    let records = parse_dump(file, &file_name, panel_type, superpanel)?;
    debug!(file = %file_name, superpanel, records = records.len(), "Parsed dump file");
    Ok(records)
}

/// Parse a dump stream
pub fn parse_dump<R: Read>(
    reader: R,
    source_name: &str,
    panel_type: PanelType,
    superpanel: bool,
) -> Result<Vec<DumpRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map(|p| p.line())
            .unwrap_or(index as u64 + 1);
        let origin = RecordOrigin::new(source_name, line);

        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let record = if superpanel {
            DumpRecord::Superpanel(parse_superpanel_row(&row, panel_type, origin)?)
        } else {
            DumpRecord::Panel(parse_panel_row(&row, panel_type, origin)?)
        };
        records.push(record);
    }

    Ok(records)
}

fn field<'r>(row: &'r StringRecord, index: usize) -> &'r str {
    row.get(index).map(str::trim).unwrap_or_default()
}

fn require_fields(row: &StringRecord, expected: usize, what: &str, origin: &RecordOrigin) -> Result<()> {
    if row.len() < expected {
        return Err(origin.malformed(format!(
            "{} row needs {} fields, got {}",
            what,
            expected,
            row.len()
        )));
    }
    Ok(())
}

fn parse_count(row: &StringRecord, index: usize, name: &str, origin: &RecordOrigin) -> Result<u32> {
    let text = field(row, index);
    text.parse()
        .map_err(|_| origin.malformed(format!("{} '{}' is not an integer", name, text)))
}

fn parse_interval(row: &StringRecord, index: usize, origin: &RecordOrigin) -> Result<Option<Interval>> {
    Interval::parse_bracketed(field(row, index)).map_err(|reason| origin.malformed(reason))
}

fn parse_panel_row(row: &StringRecord, panel_type: PanelType, origin: RecordOrigin) -> Result<PanelRecord> {
    require_fields(row, PANEL_HEADER_FIELDS + 1, "panel", &origin)?;

    let panel = PanelHeader {
        name: field(row, 0).to_string(),
        panel_id: field(row, 1).to_string(),
        version: field(row, 2).to_string(),
        signed_off: field(row, 3).to_string(),
        panel_type,
    };
    if panel.panel_id.is_empty() {
        return Err(origin.malformed("empty panel id"));
    }

    let feature = match field(row, 4) {
        "gene" => {
            require_fields(row, GENE_FIELDS, "gene", &origin)?;
            let hgnc_id = Some(field(row, 6)).filter(|id| !id.is_empty()).map(String::from);
            Feature::Gene(GeneRecord::new(field(row, 5), hgnc_id))
        },
        "str" => {
            require_fields(row, STR_FIELDS, "str", &origin)?;
            Feature::Str(StrRecord {
                name: field(row, 5).to_string(),
                gene: field(row, 6).to_string(),
                repeated_sequence: field(row, 7).to_string(),
                nb_repeats: parse_count(row, 8, "nb_normal_repeats", &origin)?,
                nb_pathogenic_repeats: parse_count(row, 9, "nb_pathogenic_repeats", &origin)?,
                chrom: field(row, 10).to_string(),
                grch37: parse_interval(row, 11, &origin)?,
                grch38: parse_interval(row, 12, &origin)?,
            })
        },
        "cnv" => {
            require_fields(row, CNV_FIELDS, "cnv", &origin)?;
            Feature::Cnv(CnvRecord {
                name: field(row, 5).to_string(),
                variant_type: field(row, 6).to_string(),
                chrom: field(row, 7).to_string(),
                grch37: parse_interval(row, 8, &origin)?,
                grch38: parse_interval(row, 9, &origin)?,
            })
        },
        other => return Err(origin.malformed(format!("unknown entity type '{}'", other))),
    };

    Ok(PanelRecord {
        panel,
        feature,
        origin,
    })
}

fn parse_superpanel_row(
    row: &StringRecord,
    panel_type: PanelType,
    origin: RecordOrigin,
) -> Result<SuperpanelRecord> {
    require_fields(row, SUPERPANEL_FIELDS, "superpanel", &origin)?;

    let record = SuperpanelRecord {
        panel_id: field(row, 0).to_string(),
        name: field(row, 1).to_string(),
        version: field(row, 2).to_string(),
        signed_off: field(row, 3).to_string(),
        panel_type,
        subpanel_id: field(row, 4).to_string(),
        subpanel_name: field(row, 5).to_string(),
        subpanel_version: field(row, 6).to_string(),
        origin,
    };
    if record.panel_id.is_empty() || record.subpanel_id.is_empty() {
        return Err(record.origin.malformed("empty superpanel or subpanel id"));
    }
    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use panel_common::PanelError;

    const PANEL_FILE: &str = "\
Cardiomyopathy\t100\t1.10\t2021-03-01\tgene\tMYH7\tHGNC:7577
Cardiomyopathy\t100\t1.10\t2021-03-01\tstr\tHTT_CAG\tHTT\tCAG\t26\t40\t4\t[3076604, 3076660]\tNone
Cardiomyopathy\t100\t1.10\t2021-03-01\tcnv\tISCA-37404\tloss\t22\t[19009792, 21452445]\t[18997265, 21464764]
";

    #[test]
    fn test_parse_normal_panel_rows() {
        let records = parse_dump(PANEL_FILE.as_bytes(), "100.tsv", PanelType::Gms, false).unwrap();
        assert_eq!(records.len(), 3);

        let DumpRecord::Panel(gene) = &records[0] else {
            panic!("expected a panel row");
        };
        assert_eq!(gene.panel.panel_id, "100");
        assert_eq!(gene.panel.version, "1.10");
        assert_eq!(
            gene.feature,
            Feature::Gene(GeneRecord::new("MYH7", Some("HGNC:7577".into())))
        );

        let DumpRecord::Panel(repeat) = &records[1] else {
            panic!("expected a panel row");
        };
        let Feature::Str(str_record) = &repeat.feature else {
            panic!("expected an STR");
        };
        assert_eq!(str_record.nb_pathogenic_repeats, 40);
        assert!(str_record.grch37.is_some());
        assert!(str_record.grch38.is_none());
        assert_eq!(repeat.origin.line, 2);
    }

    #[test]
    fn test_parse_superpanel_rows() {
        let content = "500\tCombined\t2.0\tNone\t100\tCardiomyopathy\t1.10\n";
        let records = parse_dump(content.as_bytes(), "superpanel_500.tsv", PanelType::Gms, true).unwrap();

        let DumpRecord::Superpanel(record) = &records[0] else {
            panic!("expected a superpanel row");
        };
        assert_eq!(record.panel_id, "500");
        assert_eq!(record.subpanel_id, "100");
        assert_eq!(record.subpanel_version, "1.10");
    }

    #[test]
    fn test_malformed_rows_name_file_and_line() {
        let content = "P\t1\t1.0\tNone\tgene\tA\nP\t1\t1.0\tNone\tsnv\tB\n";
        let err = parse_dump(content.as_bytes(), "1.tsv", PanelType::Gms, false).unwrap_err();
        match err {
            PanelError::MalformedRecord {
                source_name, line, ..
            } => {
                assert_eq!(source_name, "1.tsv");
                assert_eq!(line, 2);
            },
            other => panic!("unexpected error: {other}"),
        }

        let short = "P\t1\t1.0\tNone\tstr\tHTT_CAG\tHTT\n";
        assert!(parse_dump(short.as_bytes(), "1.tsv", PanelType::Gms, false).is_err());

        let bad_coords = "P\t1\t1.0\tNone\tcnv\tX\tloss\t1\t[1-5]\tNone\n";
        assert!(parse_dump(bad_coords.as_bytes(), "1.tsv", PanelType::Gms, false).is_err());
    }

    #[test]
    fn test_read_dump_dir_is_sorted_and_detects_superpanels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_200.tsv"), "B\t200\t1.0\tNone\tgene\tTTN\n").unwrap();
        std::fs::write(dir.path().join("a_100.tsv"), "A\t100\t1.0\tNone\tgene\tMYH7\n").unwrap();
        std::fs::write(
            dir.path().join("superpanel_300.tsv"),
            "300\tAB\t1.0\tNone\t100\tA\t1.0\n",
        )
        .unwrap();

        let records = read_dump_dir(dir.path(), PanelType::NonGms).unwrap();
        let ids: Vec<&str> = records
            .iter()
            .map(|r| match r {
                DumpRecord::Panel(p) => p.panel.panel_id.as_str(),
                DumpRecord::Superpanel(s) => s.panel_id.as_str(),
            })
            .collect();
        assert_eq!(ids, vec!["100", "200", "300"]);
        assert!(matches!(records[2], DumpRecord::Superpanel(_)));
    }
}
