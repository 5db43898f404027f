//! Disc graph assembly
//!
//! Accumulates parsed fragments into the in-memory disc / title / stream
//! hierarchy that the reconciler commits. Fragments may arrive in any order
//! within a level; titles and streams are created on first mention.

use crate::error::ParseError;
use crate::parser::{parse_duration, Attr, Fragment, InfoFragment};
use std::collections::BTreeMap;

/// Fully assembled metadata for one disc read
#[derive(Debug, Clone, PartialEq)]
pub struct DiscGraph {
    pub label: Option<String>,
    pub disc_type: Option<String>,
    pub volume_name: Option<String>,
    pub titles: Vec<TitleInfo>,
}

impl DiscGraph {
    /// True when the read produced no identifying disc attributes at all.
    /// Such a graph must not be committed.
    pub fn is_empty_identity(&self) -> bool {
        self.label.is_none() && self.disc_type.is_none() && self.volume_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleInfo {
    pub index: u16,
    pub name: Option<String>,
    pub duration_secs: u64,
    pub chapter_count: u32,
    pub size_bytes: u64,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: u16,
    pub kind: StreamKind,
    pub codec: Option<String>,
    pub language: Option<String>,
    /// Raw attribute values not promoted to a typed field, keyed by the
    /// wire attribute id
    pub attributes: BTreeMap<String, String>,
}

/// Stream classification, from the Type attribute's label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl StreamKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitles" | "subtitle" => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "subtitle",
            StreamKind::Other => "other",
        }
    }
}

/// What a fragment newly introduced, for discovery milestones
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Discovery {
    None,
    Title(u16),
    Stream { title_index: u16, stream_index: u16 },
}

#[derive(Debug, Default)]
struct TitleBuilder {
    name: Option<String>,
    duration_secs: u64,
    chapter_count: u32,
    size_bytes: u64,
    streams: BTreeMap<u16, StreamBuilder>,
}

#[derive(Debug, Default)]
struct StreamBuilder {
    kind: Option<StreamKind>,
    codec: Option<String>,
    language: Option<String>,
    attributes: BTreeMap<String, String>,
}

/// Incrementally builds a `DiscGraph` from fragments
#[derive(Debug, Default)]
pub struct GraphBuilder {
    label: Option<String>,
    disc_type: Option<String>,
    volume_name: Option<String>,
    declared_title_count: Option<u16>,
    titles: BTreeMap<u16, TitleBuilder>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the graph.
    ///
    /// Non-structural fragments (progress, messages, drive scans, unknown
    /// kinds) are accepted and ignored here; the session layer reacts to
    /// them separately.
    pub fn apply(&mut self, fragment: &Fragment) -> Result<Discovery, ParseError> {
        match fragment {
            Fragment::DiscInfo(info) => {
                self.apply_disc_info(info);
                Ok(Discovery::None)
            }
            Fragment::TitleInfo { title_index, info } => {
                let new = !self.titles.contains_key(title_index);
                let title = self.titles.entry(*title_index).or_default();
                apply_title_info(title, info)?;
                Ok(if new {
                    Discovery::Title(*title_index)
                } else {
                    Discovery::None
                })
            }
            Fragment::StreamInfo {
                title_index,
                stream_index,
                info,
            } => {
                let title = self.titles.entry(*title_index).or_default();
                let new = !title.streams.contains_key(stream_index);
                let stream = title.streams.entry(*stream_index).or_default();
                apply_stream_info(stream, info);
                Ok(if new {
                    Discovery::Stream {
                        title_index: *title_index,
                        stream_index: *stream_index,
                    }
                } else {
                    Discovery::None
                })
            }
            Fragment::TitleCount { count } => {
                self.declared_title_count = Some(*count);
                Ok(Discovery::None)
            }
            Fragment::ProgressCurrent { .. }
            | Fragment::ProgressTotal { .. }
            | Fragment::ProgressValue { .. }
            | Fragment::Message { .. }
            | Fragment::DriveScan { .. }
            | Fragment::Unknown { .. } => Ok(Discovery::None),
        }
    }

    fn apply_disc_info(&mut self, info: &InfoFragment) {
        match info.attr {
            Attr::Name => self.label = Some(info.value.clone()),
            Attr::Type => self.disc_type = Some(info.value.clone()),
            Attr::VolumeName => self.volume_name = Some(info.value.clone()),
            _ => {}
        }
    }

    /// True once any identifying disc attribute has been seen
    pub fn has_disc_info(&self) -> bool {
        self.label.is_some() || self.disc_type.is_some() || self.volume_name.is_some()
    }

    pub fn title_count(&self) -> usize {
        self.titles.len()
    }

    /// The TCOUT value, if the tool announced one
    pub fn declared_title_count(&self) -> Option<u16> {
        self.declared_title_count
    }

    pub fn finish(self) -> DiscGraph {
        DiscGraph {
            label: self.label,
            disc_type: self.disc_type,
            volume_name: self.volume_name,
            titles: self
                .titles
                .into_iter()
                .map(|(index, t)| TitleInfo {
                    index,
                    name: t.name,
                    duration_secs: t.duration_secs,
                    chapter_count: t.chapter_count,
                    size_bytes: t.size_bytes,
                    streams: t
                        .streams
                        .into_iter()
                        .map(|(index, s)| StreamInfo {
                            index,
                            kind: s.kind.unwrap_or(StreamKind::Other),
                            codec: s.codec,
                            language: s.language,
                            attributes: s.attributes,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn apply_title_info(title: &mut TitleBuilder, info: &InfoFragment) -> Result<(), ParseError> {
    match info.attr {
        Attr::Name => title.name = Some(info.value.clone()),
        Attr::Duration => title.duration_secs = parse_duration(&info.value)?,
        Attr::ChapterCount => {
            title.chapter_count = info.value.trim().parse().map_err(|_| {
                ParseError::MalformedRecord(format!("Bad chapter count: {:?}", info.value))
            })?;
        }
        Attr::DiskSizeBytes => {
            title.size_bytes = info.value.trim().parse().map_err(|_| {
                ParseError::MalformedRecord(format!("Bad size: {:?}", info.value))
            })?;
        }
        _ => {}
    }
    Ok(())
}

fn apply_stream_info(stream: &mut StreamBuilder, info: &InfoFragment) {
    match info.attr {
        Attr::Type => stream.kind = Some(StreamKind::from_label(&info.value)),
        Attr::CodecShort => stream.codec = Some(info.value.clone()),
        Attr::LangCode => stream.language = Some(info.value.clone()),
        _ => {
            stream
                .attributes
                .insert(info.raw_id.to_string(), info.value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_record;
    use crate::tool::split_record;

    fn apply_line(builder: &mut GraphBuilder, line: &str) -> Discovery {
        let fragment = parse_record(&split_record(line).unwrap()).unwrap();
        builder.apply(&fragment).unwrap()
    }

    #[test]
    fn test_build_small_graph() {
        let mut builder = GraphBuilder::new();
        apply_line(&mut builder, r#"CINFO:2,0,"EXAMPLE_DISC""#);
        apply_line(&mut builder, r#"CINFO:1,0,"Blu-ray disc""#);
        apply_line(&mut builder, r#"CINFO:32,0,"EXAMPLE_VOLUME""#);
        apply_line(&mut builder, "TCOUT:1");
        apply_line(&mut builder, r#"TINFO:0,2,0,"Main Feature""#);
        apply_line(&mut builder, r#"TINFO:0,9,0,"1:30:00""#);
        apply_line(&mut builder, r#"TINFO:0,8,0,"12""#);
        apply_line(&mut builder, r#"TINFO:0,11,0,"12345678""#);
        apply_line(&mut builder, r#"SINFO:0,0,1,0,"Video""#);
        apply_line(&mut builder, r#"SINFO:0,0,6,0,"Mpeg4""#);
        apply_line(&mut builder, r#"SINFO:0,1,1,0,"Audio""#);
        apply_line(&mut builder, r#"SINFO:0,1,3,0,"eng""#);

        assert!(builder.has_disc_info());
        assert_eq!(builder.declared_title_count(), Some(1));

        let graph = builder.finish();
        assert_eq!(graph.label.as_deref(), Some("EXAMPLE_DISC"));
        assert_eq!(graph.disc_type.as_deref(), Some("Blu-ray disc"));
        assert_eq!(graph.volume_name.as_deref(), Some("EXAMPLE_VOLUME"));
        assert_eq!(graph.titles.len(), 1);

        let title = &graph.titles[0];
        assert_eq!(title.name.as_deref(), Some("Main Feature"));
        assert_eq!(title.duration_secs, 5400);
        assert_eq!(title.chapter_count, 12);
        assert_eq!(title.size_bytes, 12345678);
        assert_eq!(title.streams.len(), 2);
        assert_eq!(title.streams[0].kind, StreamKind::Video);
        assert_eq!(title.streams[0].codec.as_deref(), Some("Mpeg4"));
        assert_eq!(title.streams[1].kind, StreamKind::Audio);
        assert_eq!(title.streams[1].language.as_deref(), Some("eng"));
    }

    #[test]
    fn test_discovery_reported_on_first_mention_only() {
        let mut builder = GraphBuilder::new();
        assert_eq!(
            apply_line(&mut builder, r#"TINFO:3,2,0,"A""#),
            Discovery::Title(3)
        );
        assert_eq!(
            apply_line(&mut builder, r#"TINFO:3,9,0,"0:10:00""#),
            Discovery::None
        );
        assert_eq!(
            apply_line(&mut builder, r#"SINFO:3,0,1,0,"Video""#),
            Discovery::Stream {
                title_index: 3,
                stream_index: 0
            }
        );
        assert_eq!(
            apply_line(&mut builder, r#"SINFO:3,0,6,0,"Mpeg4""#),
            Discovery::None
        );
    }

    #[test]
    fn test_stream_before_title_creates_title() {
        let mut builder = GraphBuilder::new();
        apply_line(&mut builder, r#"SINFO:2,0,1,0,"Audio""#);
        let graph = builder.finish();
        assert_eq!(graph.titles.len(), 1);
        assert_eq!(graph.titles[0].index, 2);
        assert_eq!(graph.titles[0].streams[0].kind, StreamKind::Audio);
    }

    #[test]
    fn test_unpromoted_attributes_preserved() {
        let mut builder = GraphBuilder::new();
        apply_line(&mut builder, r#"SINFO:0,0,22,0,"4608""#);
        let graph = builder.finish();
        let stream = &graph.titles[0].streams[0];
        assert_eq!(stream.attributes.get("22").map(String::as_str), Some("4608"));
    }

    #[test]
    fn test_titles_ordered_by_index() {
        let mut builder = GraphBuilder::new();
        apply_line(&mut builder, r#"TINFO:5,2,0,"Later""#);
        apply_line(&mut builder, r#"TINFO:1,2,0,"Earlier""#);
        let graph = builder.finish();
        assert_eq!(graph.titles[0].index, 1);
        assert_eq!(graph.titles[1].index, 5);
    }

    #[test]
    fn test_bad_numeric_title_attr_is_malformed() {
        let mut builder = GraphBuilder::new();
        let fragment =
            parse_record(&split_record(r#"TINFO:0,8,0,"dozen""#).unwrap()).unwrap();
        assert!(builder.apply(&fragment).is_err());
    }

    #[test]
    fn test_empty_identity() {
        let builder = GraphBuilder::new();
        assert!(!builder.has_disc_info());
        assert!(builder.finish().is_empty_identity());
    }

    #[test]
    fn test_stream_kind_labels() {
        assert_eq!(StreamKind::from_label("Video"), StreamKind::Video);
        assert_eq!(StreamKind::from_label("subtitles"), StreamKind::Subtitle);
        assert_eq!(StreamKind::from_label("Mystery"), StreamKind::Other);
        assert_eq!(StreamKind::Subtitle.as_str(), "subtitle");
    }
}
