//! Sitemap url-set and sitemap-index extraction
use crate::process::LinkResolver;
use crate::state::ResourceKind;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::io::Cursor;
use tracing::warn;

/// Visits every `<url><loc>` as HTML and every `<sitemap><loc>` as a nested sitemap
///
/// Parsing stops at the first XML error; entries read before it are kept.
pub fn collect_sitemap(resolver: &mut LinkResolver<'_>, xml: &[u8]) {
    let reader = SiteMapReader::new(Cursor::new(xml));

    for entity in reader {
        match entity {
            SiteMapEntity::Url(url_entry) => {
                if let Some(url) = url_entry.loc.get_url() {
                    resolver.visit(url.as_str(), None, Some(ResourceKind::Html));
                }
            }
            SiteMapEntity::SiteMap(sitemap_entry) => {
                if let Some(url) = sitemap_entry.loc.get_url() {
                    resolver.visit(url.as_str(), None, Some(ResourceKind::SiteMap));
                }
            }
            SiteMapEntity::Err(error) => {
                warn!("Malformed sitemap: {:?}", error);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{Pipeline, Policy};
    use crate::process::test_support::{parent, PathOnlyStore};
    use crate::process::{extract, Extracted};
    use crate::state::ResourceKind;

    fn run(xml: &str) -> Extracted {
        let pipeline = Pipeline::default();
        let policy = Policy::default();
        let mut doc = parent("https://e.com/sitemap.xml", ResourceKind::SiteMap);
        doc.depth = 2;
        extract(&doc, xml.as_bytes(), &pipeline, &policy, &PathOnlyStore)
    }

    #[test]
    fn test_urlset_entries_become_html() {
        let extracted = run(r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://e.com/docs/a</loc></url>
  <url><loc>https://e.com/docs/b.pdf</loc><lastmod>2024-01-01</lastmod></url>
</urlset>"#);

        let keys: Vec<_> = extracted.html.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["https://e.com/docs/a", "https://e.com/docs/b.pdf"]);
        assert!(extracted.html.iter().all(|r| r.depth == 3));
        assert!(extracted.other.is_empty());
        assert!(extracted.body.is_none());
    }

    #[test]
    fn test_index_entries_become_sitemaps() {
        let extracted = run(r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://e.com/sitemap-docs.xml</loc></sitemap>
</sitemapindex>"#);

        assert!(extracted.html.is_empty());
        assert_eq!(extracted.other.len(), 1);
        assert_eq!(extracted.other[0].kind, ResourceKind::SiteMap);
        assert_eq!(
            extracted.other[0].key.as_str(),
            "https://e.com/sitemap-docs.xml"
        );
    }

    #[test]
    fn test_garbage_yields_nothing() {
        let extracted = run("not xml at all");
        assert!(extracted.html.is_empty());
        assert!(extracted.other.is_empty());
    }
}
