//! Tag reading: the one place that calls into `lofty` to pull the handful of
//! fields the rest of the pipeline needs (title/album/albumartist for
//! grouping and dedup, plus the stream properties that feed the tier-1
//! quality score).

use crate::dedup::tier1::TrackTags;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use std::path::Path;

/// Read the fields tier-1 dedup needs to score and group one file.
///
/// Unreadable tags are not an error here: the file still has a path,
/// format (guessed from extension), and stream properties, so it can
/// still be scored and deduplicated even with `title: None`.
pub fn read_track_tags(path: &Path) -> TrackTags {
    let probed = Probe::open(path).ok().and_then(|p| p.read().ok());

    let (title, artist, sample_rate, bit_depth, bitrate_kbps, file_type) = match &probed {
        Some(tagged) => {
            let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
            let title = tag.and_then(|t| t.title()).map(|s| s.to_string());
            let artist = tag.and_then(|t| t.artist()).map(|s| s.to_string());
            let properties = tagged.properties();
            (
                title,
                artist,
                properties.sample_rate().unwrap_or(0),
                properties.bit_depth().unwrap_or(16) as u32,
                properties.audio_bitrate().unwrap_or(0),
                Some(tagged.file_type()),
            )
        }
        None => (None, None, 0, 16, 0, None),
    };

    TrackTags {
        path: path.to_path_buf(),
        title,
        artist,
        format: file_type
            .map(format_name)
            .unwrap_or_else(|| extension_format_guess(path)),
        bit_depth,
        sample_rate,
        bitrate_kbps,
    }
}

/// Read `albumartist` (falling back to `artist`) and `album`, returning
/// `None` for either when the file has no readable tag at all — the
/// directory-name fallback lives in [`crate::metadata`], not here, so this
/// function stays a pure tag reader.
pub fn read_album_group_tags(path: &Path) -> (Option<String>, Option<String>) {
    let Ok(probed) = Probe::open(path).and_then(|p| p.read()) else {
        return (None, None);
    };
    let Some(tag) = probed.primary_tag().or_else(|| probed.first_tag()) else {
        return (None, None);
    };

    let albumartist = tag
        .get_string(&ItemKey::AlbumArtist)
        .map(|s| s.to_string())
        .or_else(|| tag.artist().map(|s| s.to_string()));
    let album = tag.album().map(|s| s.to_string());

    (albumartist, album)
}

fn format_name(file_type: FileType) -> String {
    match file_type {
        FileType::Flac => "flac",
        FileType::Mpeg => "mp3",
        FileType::Mp4 => "m4a",
        FileType::Vorbis | FileType::Opus => "ogg",
        FileType::Wav => "wav",
        FileType::Aac => "aac",
        FileType::Aiff => "aiff",
        FileType::Ape | FileType::WavPack => "other",
        _ => "other",
    }
    .to_string()
}

/// When `lofty` cannot probe the file at all (corrupt header), fall back to
/// the extension so tier-1 quality scoring still has *something* to work
/// with rather than treating every unreadable file as equally worst-case.
fn extension_format_guess(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "other".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_file_falls_back_to_extension_format() {
        let tags = read_track_tags(Path::new("nonexistent.flac"));
        assert_eq!(tags.format, "flac");
        assert!(tags.title.is_none());
    }

    #[test]
    fn unreadable_file_has_no_album_group_tags() {
        let (albumartist, album) = read_album_group_tags(Path::new("nonexistent.mp3"));
        assert!(albumartist.is_none());
        assert!(album.is_none());
    }
}
