//! Robot-mode line protocol parser
//!
//! Turns raw records from the tool adapter into typed fragments. Each
//! fragment carries just what one output line said; assembling fragments
//! into a disc graph is the graph builder's job. Unknown record kinds and
//! unknown attribute ids are passed through rather than rejected, so newer
//! tool versions do not break the pipeline.

use crate::error::ParseError;
use crate::tool::RawRecord;

/// Well-known attribute ids used in CINFO/TINFO/SINFO records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Attr {
    Type,
    Name,
    LangCode,
    LangName,
    CodecId,
    CodecShort,
    CodecLong,
    ChapterCount,
    Duration,
    DiskSize,
    DiskSizeBytes,
    SourceFileName,
    StreamFlags,
    SegmentsCount,
    SegmentsMap,
    OutputFileName,
    MetadataLangCode,
    MetadataLangName,
    TreeInfo,
    PanelTitle,
    VolumeName,
    OrderWeight,
    /// Id not in the known table; kept with its raw id
    Other,
}

impl Attr {
    pub fn from_id(id: u16) -> Self {
        match id {
            1 => Attr::Type,
            2 => Attr::Name,
            3 => Attr::LangCode,
            4 => Attr::LangName,
            5 => Attr::CodecId,
            6 => Attr::CodecShort,
            7 => Attr::CodecLong,
            8 => Attr::ChapterCount,
            9 => Attr::Duration,
            10 => Attr::DiskSize,
            11 => Attr::DiskSizeBytes,
            16 => Attr::SourceFileName,
            22 => Attr::StreamFlags,
            25 => Attr::SegmentsCount,
            26 => Attr::SegmentsMap,
            27 => Attr::OutputFileName,
            28 => Attr::MetadataLangCode,
            29 => Attr::MetadataLangName,
            30 => Attr::TreeInfo,
            31 => Attr::PanelTitle,
            32 => Attr::VolumeName,
            33 => Attr::OrderWeight,
            _ => Attr::Other,
        }
    }
}

/// One attribute assignment from an info record
#[derive(Debug, Clone, PartialEq)]
pub struct InfoFragment {
    pub attr: Attr,
    /// The id as it appeared on the wire, kept for `Attr::Other`
    pub raw_id: u16,
    pub value: String,
}

/// One interpreted line of tool output
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Disc-level attribute (CINFO)
    DiscInfo(InfoFragment),
    /// Title-level attribute (TINFO)
    TitleInfo { title_index: u16, info: InfoFragment },
    /// Stream-level attribute (SINFO)
    StreamInfo {
        title_index: u16,
        stream_index: u16,
        info: InfoFragment,
    },
    /// Current-operation progress header (PRGC)
    ProgressCurrent {
        code: u32,
        operation_id: u16,
        name: String,
    },
    /// Total-operation progress header (PRGT)
    ProgressTotal {
        code: u32,
        operation_id: u16,
        name: String,
    },
    /// Progress bar values (PRGV)
    ProgressValue { current: u64, total: u64, max: u64 },
    /// Human-readable tool message (MSG)
    Message { code: u32, text: String },
    /// Declared number of titles (TCOUT)
    TitleCount { count: u16 },
    /// Drive enumeration line (DRV)
    DriveScan {
        index: u16,
        visible: bool,
        drive_name: String,
        disc_name: String,
    },
    /// Kind not in the protocol table; skipped downstream
    Unknown { kind: String },
}

/// Interpret one raw record.
///
/// Fields beyond the ones a kind defines are ignored, so trailing additions
/// from newer tool versions pass through. Missing or non-numeric fields in
/// the defined positions are malformed.
pub fn parse_record(record: &RawRecord) -> Result<Fragment, ParseError> {
    match record.kind.as_str() {
        "CINFO" => {
            let raw_id = field_u16(record, 0)?;
            Ok(Fragment::DiscInfo(InfoFragment {
                attr: Attr::from_id(raw_id),
                raw_id,
                value: field(record, 2)?,
            }))
        }
        "TINFO" => {
            let title_index = field_u16(record, 0)?;
            let raw_id = field_u16(record, 1)?;
            Ok(Fragment::TitleInfo {
                title_index,
                info: InfoFragment {
                    attr: Attr::from_id(raw_id),
                    raw_id,
                    value: field(record, 3)?,
                },
            })
        }
        "SINFO" => {
            let title_index = field_u16(record, 0)?;
            let stream_index = field_u16(record, 1)?;
            let raw_id = field_u16(record, 2)?;
            Ok(Fragment::StreamInfo {
                title_index,
                stream_index,
                info: InfoFragment {
                    attr: Attr::from_id(raw_id),
                    raw_id,
                    value: field(record, 4)?,
                },
            })
        }
        "PRGC" | "PRGT" => {
            let code = field_u32(record, 0)?;
            let operation_id = field_u16(record, 1)?;
            let name = field(record, 2)?;
            if record.kind == "PRGC" {
                Ok(Fragment::ProgressCurrent {
                    code,
                    operation_id,
                    name,
                })
            } else {
                Ok(Fragment::ProgressTotal {
                    code,
                    operation_id,
                    name,
                })
            }
        }
        "PRGV" => Ok(Fragment::ProgressValue {
            current: field_u64(record, 0)?,
            total: field_u64(record, 1)?,
            max: field_u64(record, 2)?,
        }),
        "MSG" => Ok(Fragment::Message {
            code: field_u32(record, 0)?,
            text: field(record, 3)?,
        }),
        "TCOUT" => Ok(Fragment::TitleCount {
            count: field_u16(record, 0)?,
        }),
        "DRV" => Ok(Fragment::DriveScan {
            index: field_u16(record, 0)?,
            visible: field_u16(record, 1)? != 0,
            drive_name: field(record, 4)?,
            disc_name: field(record, 5)?,
        }),
        _ => Ok(Fragment::Unknown {
            kind: record.kind.clone(),
        }),
    }
}

/// Parse a `H:MM:SS` or `MM:SS` duration into whole seconds
pub fn parse_duration(value: &str) -> Result<u64, ParseError> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    let malformed = || ParseError::MalformedRecord(format!("Bad duration: {:?}", value));

    let nums: Vec<u64> = parts
        .iter()
        .map(|p| p.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;

    match nums.as_slice() {
        [h, m, s] => Ok(h * 3600 + m * 60 + s),
        [m, s] => Ok(m * 60 + s),
        _ => Err(malformed()),
    }
}

fn field(record: &RawRecord, index: usize) -> Result<String, ParseError> {
    record.fields.get(index).cloned().ok_or_else(|| {
        ParseError::MalformedRecord(format!(
            "{} record missing field {} (got {})",
            record.kind,
            index,
            record.fields.len()
        ))
    })
}

fn field_u16(record: &RawRecord, index: usize) -> Result<u16, ParseError> {
    parse_num(record, index)
}

fn field_u32(record: &RawRecord, index: usize) -> Result<u32, ParseError> {
    parse_num(record, index)
}

fn field_u64(record: &RawRecord, index: usize) -> Result<u64, ParseError> {
    parse_num(record, index)
}

fn parse_num<T: std::str::FromStr>(record: &RawRecord, index: usize) -> Result<T, ParseError> {
    let raw = field(record, index)?;
    raw.trim().parse().map_err(|_| {
        ParseError::MalformedRecord(format!(
            "{} record field {} not numeric: {:?}",
            record.kind, index, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::split_record;

    fn parse_line(line: &str) -> Result<Fragment, ParseError> {
        parse_record(&split_record(line).unwrap())
    }

    #[test]
    fn test_parse_disc_info() {
        let fragment = parse_line(r#"CINFO:2,0,"EXAMPLE_DISC""#).unwrap();
        assert_eq!(
            fragment,
            Fragment::DiscInfo(InfoFragment {
                attr: Attr::Name,
                raw_id: 2,
                value: "EXAMPLE_DISC".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_title_info_duration() {
        let fragment = parse_line(r#"TINFO:0,9,0,"1:32:04""#).unwrap();
        match fragment {
            Fragment::TitleInfo { title_index, info } => {
                assert_eq!(title_index, 0);
                assert_eq!(info.attr, Attr::Duration);
                assert_eq!(parse_duration(&info.value).unwrap(), 5524);
            }
            other => panic!("unexpected fragment: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stream_info() {
        let fragment = parse_line(r#"SINFO:0,1,6,0,"DTS-HD MA""#).unwrap();
        assert_eq!(
            fragment,
            Fragment::StreamInfo {
                title_index: 0,
                stream_index: 1,
                info: InfoFragment {
                    attr: Attr::CodecShort,
                    raw_id: 6,
                    value: "DTS-HD MA".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_unknown_attribute_id_kept() {
        let fragment = parse_line(r#"CINFO:97,0,"future value""#).unwrap();
        match fragment {
            Fragment::DiscInfo(info) => {
                assert_eq!(info.attr, Attr::Other);
                assert_eq!(info.raw_id, 97);
                assert_eq!(info.value, "future value");
            }
            other => panic!("unexpected fragment: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let fragment = parse_line("XYZZY:1,2,3").unwrap();
        assert_eq!(
            fragment,
            Fragment::Unknown {
                kind: "XYZZY".to_string()
            }
        );
    }

    #[test]
    fn test_trailing_fields_ignored() {
        let fragment = parse_line("TCOUT:3,extra,fields").unwrap();
        assert_eq!(fragment, Fragment::TitleCount { count: 3 });
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let result = parse_line("TINFO:0,9");
        assert!(matches!(result, Err(ParseError::MalformedRecord(_))));
    }

    #[test]
    fn test_non_numeric_index_is_malformed() {
        let result = parse_line(r#"TINFO:abc,9,0,"1:00:00""#);
        assert!(matches!(result, Err(ParseError::MalformedRecord(_))));
    }

    #[test]
    fn test_parse_progress_records() {
        assert_eq!(
            parse_line(r#"PRGC:5057,0,"Scanning contents""#).unwrap(),
            Fragment::ProgressCurrent {
                code: 5057,
                operation_id: 0,
                name: "Scanning contents".to_string(),
            }
        );
        assert_eq!(
            parse_line("PRGV:32768,16384,65536").unwrap(),
            Fragment::ProgressValue {
                current: 32768,
                total: 16384,
                max: 65536,
            }
        );
    }

    #[test]
    fn test_parse_message() {
        let fragment =
            parse_line(r#"MSG:1005,0,1,"Tool started","%1","Tool started""#).unwrap();
        assert_eq!(
            fragment,
            Fragment::Message {
                code: 1005,
                text: "Tool started".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_drive_scan() {
        let fragment =
            parse_line(r#"DRV:0,2,999,1,"BD-RE ASUS","EXAMPLE_DISC","/dev/sr0""#).unwrap();
        assert_eq!(
            fragment,
            Fragment::DriveScan {
                index: 0,
                visible: true,
                drive_name: "BD-RE ASUS".to_string(),
                disc_name: "EXAMPLE_DISC".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("0:05:30").unwrap(), 330);
        assert_eq!(parse_duration("12:34").unwrap(), 754);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1:2:3:4").is_err());
        assert!(parse_duration("abc").is_err());
    }
}
