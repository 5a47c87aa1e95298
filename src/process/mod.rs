//! Content processors, one per resource kind
//!
//! Each processor extracts child links from a fetched payload, runs every
//! link through the skip predicate, the canonicalization pipeline and the drop
//! predicate, and rewrites the payload so surviving links point at their
//! local copies.
//!
//! - HTML: link-bearing elements, `srcset`, inline styles
//! - CSS: `@import` and `url()` references
//! - SiteMap: `<url><loc>` and `<sitemap><loc>` entries
//! - Binary: nothing to extract

mod css;
mod html;
mod sitemap;

pub use css::{collect_css, rewrite_css};
pub use html::{collect_html, rewrite_html};
pub use sitemap::collect_sitemap;

use crate::pipeline::{LinkContext, Pipeline, Policy};
use crate::state::{Resource, ResourceKind};
use crate::storage::{relative_link, Persister};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use url::Url;

/// Content types that are never parsed, whatever kind a link suggested
const OPAQUE_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
];

/// Children and rewritten payload produced by a content processor
#[derive(Debug, Default)]
pub struct Extracted {
    /// Crawlable HTML children, in discovery order
    pub html: Vec<Resource>,
    /// All other children, in discovery order
    pub other: Vec<Resource>,
    /// Rewritten payload; `None` means save the fetched bytes unchanged
    pub body: Option<Vec<u8>>,
    /// Rewritten payload for the redirect target's save path, when the
    /// document owns one
    pub redirected_body: Option<Vec<u8>>,
}

/// What became of one raw link
#[derive(Debug)]
pub enum LinkResolution {
    /// Ignored before canonicalization, or unresolvable; left untouched
    Skipped,
    /// Resolved but vetoed by the drop predicate; linked absolutely
    Vetoed(Url),
    /// A new child resource
    Admit(Resource),
}

/// Where a visited link points once rewritten
#[derive(Debug, Clone)]
enum Target {
    /// Local copy, linked relative to the document being written
    Local { path: PathBuf, fragment: String },
    /// Absolute URL, used for vetoed links
    Absolute(String),
}

/// Resolves the links of one document and remembers their local replacements
pub struct LinkResolver<'a> {
    pipeline: &'a Pipeline,
    policy: &'a Policy,
    store: &'a dyn Persister,
    parent: &'a Resource,
    base: &'a Url,
    document_path: &'a Path,
    targets: HashMap<String, Option<Target>>,
    seen: HashSet<Url>,
    extracted: Extracted,
}

impl<'a> LinkResolver<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        policy: &'a Policy,
        store: &'a dyn Persister,
        parent: &'a Resource,
    ) -> Self {
        // a redirected document's relative links are relative to where it actually lives
        let base = parent.redirected.as_ref().unwrap_or(&parent.key);

        Self {
            pipeline,
            policy,
            store,
            parent,
            base,
            document_path: parent.save_path.as_path(),
            targets: HashMap::new(),
            seen: HashSet::new(),
            extracted: Extracted::default(),
        }
    }

    /// Runs a raw link through skip, canonicalization, detection and drop
    ///
    /// `hint` overrides the type detector when the referring context already
    /// knows the kind (stylesheet links, `@import`, sitemap entries).
    pub fn resolve(
        &self,
        raw: &str,
        tag: Option<&str>,
        hint: Option<ResourceKind>,
    ) -> LinkResolution {
        let ctx = LinkContext::new(Some(self.base), tag);

        if self.policy.should_skip(raw, &ctx) {
            trace!("Skipping link {:?}", raw);
            return LinkResolution::Skipped;
        }

        let Some(key) = self.pipeline.canonicalize(raw, &ctx) else {
            return LinkResolution::Skipped;
        };

        let kind = hint.unwrap_or_else(|| self.policy.detect(&key, tag));
        let save_path = self.store.save_path(&key);
        let mut resource = Resource::new(
            raw,
            key,
            kind,
            self.parent.depth + 1,
            Some(self.parent.key.clone()),
            save_path,
        );

        let key_before = resource.key.clone();
        self.policy.init_resource(&mut resource);
        if resource.key != key_before {
            resource.save_path = self.store.save_path(&resource.key);
        }

        if self.policy.should_drop(&resource) {
            debug!("Dropping {} found in {}", resource.key, self.parent.key);
            return LinkResolution::Vetoed(resource.key);
        }

        LinkResolution::Admit(resource)
    }

    /// Resolves a raw link once per document, collecting the child and the
    /// text that replaces the link in the rewritten payload
    pub fn visit(&mut self, raw: &str, tag: Option<&str>, hint: Option<ResourceKind>) {
        if self.targets.contains_key(raw) {
            return;
        }

        let fragment = raw
            .split_once('#')
            .map(|(_, f)| format!("#{}", f))
            .unwrap_or_default();

        let target = match self.resolve(raw, tag, hint) {
            LinkResolution::Skipped => None,
            LinkResolution::Vetoed(url) => Some(Target::Absolute(format!("{}{}", url, fragment))),
            LinkResolution::Admit(resource) => {
                let path = resource.save_path.clone();
                if self.seen.insert(resource.key.clone()) {
                    match resource.kind {
                        ResourceKind::Html => self.extracted.html.push(resource),
                        _ => self.extracted.other.push(resource),
                    }
                }
                Some(Target::Local { path, fragment })
            }
        };

        self.targets.insert(raw.to_string(), target);
    }

    /// Replacement text for a raw link visited earlier, relative to the
    /// document currently being written
    pub fn replacement(&self, raw: &str) -> Option<String> {
        match self.targets.get(raw)?.as_ref()? {
            Target::Local { path, fragment } => Some(format!(
                "{}{}",
                relative_link(self.document_path, path),
                fragment
            )),
            Target::Absolute(url) => Some(url.clone()),
        }
    }

    /// Makes later replacements relative to another copy of the document
    pub fn relative_to(&mut self, document_path: &'a Path) {
        self.document_path = document_path;
    }

    pub fn into_extracted(self) -> Extracted {
        self.extracted
    }
}

/// Returns true if the content type says the payload is not markup or styles
pub fn is_opaque_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ["image/", "audio/", "video/", "font/"]
        .iter()
        .any(|p| mime.starts_with(p))
        || OPAQUE_CONTENT_TYPES.contains(&mime.as_str())
}

/// Renders a rewritten payload for the document's save path and, when it
/// owns a redirect target at another path, once more for that copy
fn render_each_copy<'a, F>(
    resolver: &mut LinkResolver<'a>,
    redirect_path: Option<&'a Path>,
    render: F,
) -> (Vec<u8>, Option<Vec<u8>>)
where
    F: Fn(&LinkResolver<'a>) -> Vec<u8>,
{
    let primary = render(resolver);
    let redirected = redirect_path.map(|path| {
        resolver.relative_to(path);
        render(resolver)
    });
    (primary, redirected)
}

/// Runs the content processor for the resource's kind
///
/// HTML and CSS whose response is clearly something else are saved verbatim.
pub fn extract(
    resource: &Resource,
    body: &[u8],
    pipeline: &Pipeline,
    policy: &Policy,
    store: &dyn Persister,
) -> Extracted {
    let mut resolver = LinkResolver::new(pipeline, policy, store, resource);
    let opaque = is_opaque_content_type(resource.content_type.as_deref());
    let redirect_path = resource
        .redirected_save_path
        .as_deref()
        .filter(|path| *path != resource.save_path);

    let rendered = match resource.kind {
        ResourceKind::Html if opaque => None,
        ResourceKind::Css if opaque => None,
        ResourceKind::Html => {
            let text = String::from_utf8_lossy(body).into_owned();
            let text = policy.run_pre_process_html(resource, text);
            collect_html(&mut resolver, &text);
            Some(render_each_copy(&mut resolver, redirect_path, |r| {
                policy
                    .run_post_process_html(resource, rewrite_html(r, &text))
                    .into_bytes()
            }))
        }
        ResourceKind::Css => {
            let text = String::from_utf8_lossy(body);
            collect_css(&mut resolver, &text);
            Some(render_each_copy(&mut resolver, redirect_path, |r| {
                rewrite_css(r, &text).into_bytes()
            }))
        }
        ResourceKind::SiteMap => {
            collect_sitemap(&mut resolver, body);
            None
        }
        ResourceKind::Binary => None,
    };

    if opaque && matches!(resource.kind, ResourceKind::Html | ResourceKind::Css) {
        debug!(
            "{} served as {:?}; saving without extraction",
            resource.key, resource.content_type
        );
    }

    let mut extracted = resolver.into_extracted();
    if let Some((body, redirected_body)) = rendered {
        extracted.body = Some(body);
        extracted.redirected_body = redirected_body;
    }
    extracted
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::state::{Resource, ResourceKind};
    use crate::storage::{save_path, Persister, StorageResult};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use url::Url;

    /// Persister that only computes paths
    pub struct PathOnlyStore;

    #[async_trait]
    impl Persister for PathOnlyStore {
        fn save_path(&self, key: &Url) -> PathBuf {
            save_path(&PathBuf::from("/m"), key)
        }

        async fn save(&self, _resource: &Resource) -> StorageResult<()> {
            Ok(())
        }
    }

    pub fn parent(url: &str, kind: ResourceKind) -> Resource {
        let key = Url::parse(url).unwrap();
        let path = PathOnlyStore.save_path(&key);
        Resource::new(url, key, kind, 0, None, path)
    }
}
