//! Favourites documents: parse, union-merge and write.
//!
//! A favourites file is `<favourites>` with one `<favourite>` child per entry; the text content of
//! each child is an opaque command string. Attributes (display name, thumbnail) are ignored here.

use crate::utils::errors::{Result, SyncError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ROOT_ELEMENT: &[u8] = b"favourites";
const ENTRY_ELEMENT: &[u8] = b"favourite";

/// Ordered list of favourite actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavouritesDocument {
    actions: Vec<String>,
}

impl FavouritesDocument {
    pub fn new<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Trimmed, non-blank entries with duplicates removed (first occurrence wins).
    pub fn dedup(&self) -> Self {
        let mut seen = HashSet::new();
        let actions = self
            .actions
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty() && seen.insert(a.to_string()))
            .map(str::to_string)
            .collect();
        Self { actions }
    }

    /// Read a favourites file. Missing, unreadable or malformed files yield an empty document.
    pub fn parse(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No favourites read from {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match parse_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring malformed favourites file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Union merge: every local entry in order, then server entries not already present.
    ///
    /// Membership is decided on the trimmed string; blank entries never appear in the result.
    pub fn merge_union(local: &Self, server: &Self) -> Self {
        let mut seen = HashSet::new();
        let actions = local
            .actions
            .iter()
            .chain(server.actions.iter())
            .map(|a| a.trim())
            .filter(|a| !a.is_empty() && seen.insert(a.to_string()))
            .map(str::to_string)
            .collect();
        Self { actions }
    }

    /// Serialize to `path`, one `<favourite>` per non-blank entry.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_xml()?)?;
        debug!("Wrote {} favourites to {}", self.len(), path.display());
        Ok(())
    }

    fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("favourites")))
            .map_err(xml_err)?;
        for action in self.actions.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            writer
                .write_event(Event::Start(BytesStart::new("favourite")))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(action)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("favourite")))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("favourites")))
            .map_err(xml_err)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn parse_str(content: &str) -> Result<FavouritesDocument> {
    let mut reader = Reader::from_str(content);
    let mut actions = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    // Text of the <favourite> currently open directly under the root
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    if seen_root || e.name().as_ref() != ROOT_ELEMENT {
                        return Err(unexpected_root(&e));
                    }
                    seen_root = true;
                } else if depth == 1 && e.name().as_ref() == ENTRY_ELEMENT {
                    current = Some(String::new());
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    // `<favourites/>` is a valid empty document
                    if seen_root || e.name().as_ref() != ROOT_ELEMENT {
                        return Err(unexpected_root(&e));
                    }
                    seen_root = true;
                }
            }
            Event::Text(t) => {
                if let (Some(text), 2) = (current.as_mut(), depth) {
                    let unescaped = t.unescape().map_err(xml_err)?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if let (Some(text), 2) = (current.as_mut(), depth) {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some(text) = current.take() {
                        let action = text.trim();
                        if !action.is_empty() {
                            actions.push(action.to_string());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 || !seen_root {
        return Err(SyncError::Xml("document is incomplete".to_string()));
    }
    Ok(FavouritesDocument { actions })
}

fn xml_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Xml(e.to_string())
}

fn unexpected_root(e: &BytesStart<'_>) -> SyncError {
    SyncError::Xml(format!(
        "unexpected root element <{}>",
        String::from_utf8_lossy(e.name().as_ref())
    ))
}

/// `favourites.xml` -> `favourites.xml.bak`
pub fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Copy `path` to its `.bak` sibling. `Ok(None)` when there is nothing to back up.
pub fn backup_to_bak(path: &Path) -> Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bak = bak_path(path);
    fs::copy(path, &bak)?;
    debug!("Backed up {} to {}", path.display(), bak.display());
    Ok(Some(bak))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn doc(actions: &[&str]) -> FavouritesDocument {
        FavouritesDocument::new(actions.iter().copied())
    }

    #[test]
    fn test_parse_kodi_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favourites.xml");
        fs::write(
            &path,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<favourites>
    <favourite name="Movies" thumb="special://x.png">ActivateWindow(10025,&quot;videodb://movies/&quot;,return)</favourite>
    <favourite name="blank">   </favourite>
    <favourite name="Settings">  ActivateWindow(10000)  </favourite>
    <favourite name="empty" />
</favourites>"#,
        )
        .unwrap();

        let parsed = FavouritesDocument::parse(&path);
        assert_eq!(
            parsed.actions(),
            &[
                r#"ActivateWindow(10025,"videodb://movies/",return)"#.to_string(),
                "ActivateWindow(10000)".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_failures_yield_empty_document() {
        let dir = TempDir::new().unwrap();
        assert!(FavouritesDocument::parse(&dir.path().join("missing.xml")).is_empty());

        for content in [
            "not xml at all <<",
            "<favourites><favourite>a</favourites>",
            "<favourites><favourite>a</favourite>",
            "<sources><favourite>a</favourite></sources>",
            "",
        ] {
            let path = dir.path().join("bad.xml");
            fs::write(&path, content).unwrap();
            assert!(FavouritesDocument::parse(&path).is_empty(), "{content:?}");
        }
    }

    #[test]
    fn test_merge_keeps_local_order_and_appends_server_only() {
        let local = doc(&["A", "B"]);
        let server = doc(&["C", " B ", "A", "D"]);
        let merged = FavouritesDocument::merge_union(&local, &server);
        assert_eq!(merged, doc(&["A", "B", "C", "D"]));
    }

    #[test]
    fn test_write_then_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favourites.xml");
        let original = doc(&["PlayMedia(\"a & b\")", "  ", "RunScript(<x>)"]);
        original.write(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("&amp;"));

        let parsed = FavouritesDocument::parse(&path);
        assert_eq!(parsed, doc(&["PlayMedia(\"a & b\")", "RunScript(<x>)"]));
    }

    #[test]
    fn test_empty_document_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favourites.xml");
        FavouritesDocument::default().write(&path).unwrap();
        assert!(FavouritesDocument::parse(&path).is_empty());
    }

    #[test]
    fn test_backup_to_bak() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favourites.xml");
        assert!(backup_to_bak(&path).unwrap().is_none());

        fs::write(&path, "<favourites/>").unwrap();
        let bak = backup_to_bak(&path).unwrap().unwrap();
        assert_eq!(bak, dir.path().join("favourites.xml.bak"));
        assert_eq!(fs::read_to_string(bak).unwrap(), "<favourites/>");
    }

    fn action() -> impl Strategy<Value = String> {
        prop_oneof![
            "[ ]{0,2}ActivateWindow\\([0-9]{1,5}\\)[ ]{0,2}",
            "PlayMedia\\(\"[a-z&<>/ ]{0,12}\"\\)",
            "[ ]{0,3}",
        ]
    }

    fn normalized_set(d: &FavouritesDocument) -> BTreeSet<String> {
        d.actions()
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()
    }

    proptest! {
        #[test]
        fn prop_self_merge_is_dedup(actions in prop::collection::vec(action(), 0..12)) {
            let l = FavouritesDocument::new(actions);
            prop_assert_eq!(FavouritesDocument::merge_union(&l, &l), l.dedup());
        }

        #[test]
        fn prop_union_membership_is_symmetric(
            l in prop::collection::vec(action(), 0..10),
            s in prop::collection::vec(action(), 0..10),
        ) {
            let l = FavouritesDocument::new(l);
            let s = FavouritesDocument::new(s);
            let expected: BTreeSet<String> = normalized_set(&l).union(&normalized_set(&s)).cloned().collect();
            prop_assert_eq!(normalized_set(&FavouritesDocument::merge_union(&l, &s)), expected.clone());
            prop_assert_eq!(normalized_set(&FavouritesDocument::merge_union(&s, &l)), expected);
        }

        #[test]
        fn prop_write_parse_identity(actions in prop::collection::vec(action(), 0..10)) {
            let d = FavouritesDocument::new(actions).dedup();
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("favourites.xml");
            d.write(&path).unwrap();
            prop_assert_eq!(FavouritesDocument::parse(&path), d);
        }
    }
}
