//! Cache file naming
//!
//! Maps a URL onto a flat, filesystem-safe cache file name and classifies
//! URLs by their filename extension.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything that is not `[A-Za-z0-9_]`.
static NON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static regex is valid"));

/// Trailing `.ext`, optionally followed by a query string or fragment.
static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\.[A-Za-z0-9_]+)([?#].*)?$").expect("static regex is valid"));

/// Extensions never rendered as previews.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".amr", ".arj", ".avi", ".azw3", ".bak", ".bibtex", ".bz2", ".cfg", ".com", ".conf", ".csv",
    ".db", ".deb", ".doc", ".docx", ".dia", ".epub", ".exe", ".flv", ".gz", ".ics", ".iso",
    ".jar", ".json", ".md", ".mobi", ".mp3", ".mp4", ".mpeg", ".odf", ".odg", ".odp", ".ods",
    ".odt", ".otf", ".oxt", ".pas", ".pdf", ".ppd", ".ppt", ".pptx", ".rip", ".rpm", ".spk",
    ".sxg", ".sxw", ".ttf", ".vbox", ".vmdk", ".vcs", ".wav", ".xls", ".xpi", ".xsl", ".zip",
];

/// Raster images fetched directly instead of rendered.
pub const DIRECT_IMAGE_EXTENSIONS: &[&str] = &[".gif", ".jpeg", ".jpg", ".png", ".svg"];

/// Encoded format of a rendered preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Lossless, used for quality 100.
    Png,
    /// Lossy, used for any quality below 100.
    Jpeg,
}

impl ImageKind {
    /// Format implied by a quality setting.
    pub fn for_quality(quality: u8) -> Self {
        if quality < 100 {
            ImageKind::Jpeg
        } else {
            ImageKind::Png
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
        }
    }

    /// The other supported format.
    pub fn alternate(self) -> Self {
        match self {
            ImageKind::Png => ImageKind::Jpeg,
            ImageKind::Jpeg => ImageKind::Png,
        }
    }

    pub(crate) fn format(self) -> image::ImageFormat {
        match self {
            ImageKind::Png => image::ImageFormat::Png,
            ImageKind::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How a URL is handled by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlClass {
    /// Non-previewable document type; carries the lowercased extension.
    Excluded(String),
    /// Raster image downloaded as-is; carries the lowercased extension.
    DirectImage(String),
    /// Anything else is rendered by the browser backend.
    Page,
}

/// Remove every character that is not a letter, digit or underscore.
///
/// Punctuation runs are dropped rather than replaced, so URLs differing only
/// in punctuation share a name.
pub fn sanitize(url: &str) -> String {
    NON_WORD_RE.replace_all(url, "").into_owned()
}

/// The last `.ext` segment of `url` before any `?` or `#`, including the dot.
///
/// Returns an empty string when there is none.
pub fn derive_extension(url: &str) -> String {
    EXTENSION_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Cache file name (without directory) for a rendered preview of `url`.
pub fn cache_file_name(url: &str, kind: ImageKind) -> String {
    format!("{}.{}", sanitize(url), kind.extension())
}

/// Full cache path for a rendered preview of `url` inside `dir`.
pub fn cache_path(dir: &Path, url: &str, kind: ImageKind) -> PathBuf {
    dir.join(cache_file_name(url, kind))
}

/// Classify `url` by the extension of its path.
///
/// For absolute URLs only the path component is inspected, so a bare domain
/// such as `https://example.com` is a page, not a `.com` file.
pub fn classify(url: &str) -> UrlClass {
    let target = match url::Url::parse(url) {
        Ok(parsed) if parsed.has_host() => parsed.path().to_string(),
        _ => url.to_string(),
    };
    let ext = derive_extension(&target).to_lowercase();
    if ext.is_empty() {
        return UrlClass::Page;
    }

    if EXCLUDED_EXTENSIONS.contains(&ext.as_str()) {
        UrlClass::Excluded(ext)
    } else if DIRECT_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        UrlClass::DirectImage(ext)
    } else {
        UrlClass::Page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_punctuation() {
        assert_eq!(sanitize("http://dev.mwat.de/#main"), "httpdevmwatdemain");
        assert_eq!(
            sanitize("http://www.gibbet.nich/~matthias/index.html"),
            "httpwwwgibbetnichmatthiasindexhtml"
        );
        assert_eq!(sanitize("gopher://localhost/a/b/c"), "gopherlocalhostabc");
        assert_eq!(sanitize("snake_case-url"), "snake_caseurl");
    }

    #[test]
    fn test_sanitize_output_alphabet_and_idempotence() {
        let urls = [
            "",
            "https://example.com/päge?q=ä&x=1#frag",
            "ftp://user:pw@host:21/dir/file.tar.gz",
            "  spaced out  ",
            "日本語.jp/パス",
        ];
        for url in urls {
            let once = sanitize(url);
            assert!(
                once.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "unexpected character in {:?}",
                once
            );
            assert_eq!(sanitize(&once), once);
        }
    }

    #[test]
    fn test_derive_extension() {
        let cases = [
            ("", ""),
            ("image.gif", ".gif"),
            ("document.txt", ".txt"),
            ("document.txt.doc", ".doc"),
            ("http://example.com/page.html?view=print", ".html"),
            ("http://example.com/sometopic?show=all&lang=en", ""),
            ("http://example.com/page.md?view=print#top", ".md"),
            (
                "https://github.com/mwat56/Nele/blob/master/README.md#nele-blog",
                ".md",
            ),
        ];
        for (url, want) in cases {
            assert_eq!(derive_extension(url), want, "url: {}", url);
        }
    }

    #[test]
    fn test_cache_file_name_uses_format_extension() {
        assert_eq!(
            cache_file_name("https://example.com/page", ImageKind::Png),
            "httpsexamplecompage.png"
        );
        assert_eq!(
            cache_file_name("https://example.com/page", ImageKind::Jpeg),
            "httpsexamplecompage.jpeg"
        );
        assert_eq!(
            cache_path(Path::new("/tmp/cache"), "a.b", ImageKind::Png),
            PathBuf::from("/tmp/cache/ab.png")
        );
    }

    #[test]
    fn test_image_kind_for_quality() {
        assert_eq!(ImageKind::for_quality(100), ImageKind::Png);
        assert_eq!(ImageKind::for_quality(99), ImageKind::Jpeg);
        assert_eq!(ImageKind::for_quality(1), ImageKind::Jpeg);
        assert_eq!(ImageKind::Png.alternate(), ImageKind::Jpeg);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("https://example.com/report.pdf"),
            UrlClass::Excluded(".pdf".to_string())
        );
        assert_eq!(
            classify("https://example.com/Photo.PNG?size=large"),
            UrlClass::DirectImage(".png".to_string())
        );
        assert_eq!(classify("https://example.com/index.html"), UrlClass::Page);
        assert_eq!(classify("https://example.com"), UrlClass::Page);
        assert_eq!(classify("https://example.com/"), UrlClass::Page);
        assert_eq!(
            classify("archive.zip"),
            UrlClass::Excluded(".zip".to_string())
        );
    }
}
