//! Best-effort tag extraction for library scans.

use std::path::Path;

use lofty::{Accessor, ItemKey, TaggedFileExt, read_from_path};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Tags used to place a file in the artist/album tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub track_number: Option<u32>,
}

impl TrackTags {
    /// Defaults derived from the file name alone.
    pub fn fallback(path: &Path) -> Self {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>")
            .to_string();
        Self {
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            title,
            track_number: None,
        }
    }
}

/// Read artist/album/title/track number; never fails.
///
/// Missing or blank values keep the filename-derived defaults.
pub fn read_tags(path: &Path) -> TrackTags {
    let mut tags = TrackTags::fallback(path);

    let tagged_file = match read_from_path(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "tag read failed");
            return tags;
        }
    };
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return tags;
    };

    if let Some(artist) = non_blank(tag.artist().as_deref()) {
        tags.artist = artist;
    }
    if let Some(album) = non_blank(tag.album().as_deref()) {
        tags.album = album;
    }
    if let Some(title) = non_blank(tag.title().as_deref()) {
        tags.title = title;
    }
    tags.track_number = tag
        .track()
        .or_else(|| tag.get_string(&ItemKey::TrackNumber).and_then(parse_track_number));

    tags
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse `"7"` or `"7/12"` into `7`.
pub fn parse_track_number(raw: &str) -> Option<u32> {
    raw.split('/')
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_track_number_handles_totals() {
        assert_eq!(parse_track_number("3/12"), Some(3));
        assert_eq!(parse_track_number(" 9 "), Some(9));
        assert_eq!(parse_track_number("A1"), None);
    }

    #[test]
    fn unreadable_file_falls_back_to_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Some Song.mp3");
        std::fs::write(&path, b"not really audio").unwrap();

        let tags = read_tags(&path);
        assert_eq!(tags.artist, UNKNOWN_ARTIST);
        assert_eq!(tags.album, UNKNOWN_ALBUM);
        assert_eq!(tags.title, "Some Song");
        assert_eq!(tags.track_number, None);
    }

    #[test]
    fn missing_file_still_yields_defaults() {
        let tags = read_tags(Path::new("/definitely/not/here/track.flac"));
        assert_eq!(tags.title, "track");
    }
}
