use chrono::NaiveDate;
use semver::Version;

use crate::config::BannerText;

/// Renders the comment block prefixed to every distributable bundle.
///
/// The banner is recomputed on each build from the current version and the
/// session date, it is never cached.
pub fn render(text: &BannerText, version: &Version, date: NaiveDate) -> String {
    format!(
        "/**\n * {} {} built on {}.\n * {}\n *\n * {}\n */\n",
        text.project,
        version,
        date.format("%Y-%m-%d"),
        text.copyright,
        text.links,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_banner_contains_version_and_date() {
        let banner = render(
            &BannerText::default(),
            &Version::new(1, 2, 3),
            date(2026, 10, 19),
        );

        assert!(banner.starts_with("/**\n"));
        assert!(banner.contains(" * VexTab 1.2.3 built on 2026-10-19.\n"));
        assert!(banner.ends_with(" */\n"));
    }

    #[test]
    fn test_banners_differ_only_by_date() {
        let text = BannerText::default();
        let version = Version::new(3, 0, 1);
        let a = render(&text, &version, date(2026, 1, 2));
        let b = render(&text, &version, date(2026, 3, 4));

        assert_ne!(a, b);
        assert_eq!(
            a.replace("2026-01-02", "DATE"),
            b.replace("2026-03-04", "DATE")
        );
    }
}
