use std::fs;
use std::path::{Path, PathBuf};

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{Error, Result};
use crate::util::xdg;

/// Relative location of the interpreter registry inside a product directory.
const REGISTRY_SUFFIX: &str = "options/jdk.table.xml";

/// Display name under which an environment is registered with the IDE.
pub fn entry_name(version: &str, name: &str) -> String {
    format!("Python {version} ({name})")
}

/// In-memory interpreter registry document.
///
/// Wraps the XML payload behind a name-keyed entry interface so the XML
/// library stays an implementation detail. Mutations flip a dirty flag;
/// serialization is only worth doing when that flag is set.
#[derive(Debug, Clone)]
pub struct RegistryDocument {
    root: Element,
    dirty: bool,
}

impl RegistryDocument {
    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let root = Element::parse(contents.as_bytes()).map_err(|err| err.to_string())?;
        let document = Self { root, dirty: false };
        // fail early when the payload has no entry container at all
        document.container().map_err(|err| err.to_string())?;
        Ok(document)
    }

    fn container(&self) -> std::result::Result<&Element, String> {
        if self.root.name == "component" {
            return Ok(&self.root);
        }
        self.root
            .children
            .iter()
            .find_map(|node| match node {
                XMLNode::Element(el) if el.name == "component" => Some(el),
                _ => None,
            })
            .ok_or_else(|| "no <component> entry container".to_string())
    }

    fn container_mut(&mut self) -> &mut Element {
        if self.root.name == "component" {
            return &mut self.root;
        }
        self.root
            .children
            .iter_mut()
            .find_map(|node| match node {
                XMLNode::Element(el) if el.name == "component" => Some(el),
                _ => None,
            })
            .expect("container checked at parse time")
    }

    fn node_name(node: &XMLNode) -> Option<&str> {
        let entry = match node {
            XMLNode::Element(el) if el.name == "jdk" => el,
            _ => return None,
        };
        entry
            .children
            .iter()
            .find_map(|child| match child {
                XMLNode::Element(el) if el.name == "name" => el.attributes.get("value"),
                _ => None,
            })
            .map(String::as_str)
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.container()
            .map(|container| {
                container
                    .children
                    .iter()
                    .filter_map(Self::node_name)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry_names().iter().any(|n| n == name)
    }

    /// Add an entry unless one with the same name already exists.
    ///
    /// First write wins: a later call with a different fragment for the same
    /// name is silently ignored. Returns whether the document changed.
    pub fn upsert(&mut self, name: &str, fragment: &str) -> std::result::Result<bool, String> {
        if self.contains(name) {
            return Ok(false);
        }

        let node = Element::parse(fragment.as_bytes()).map_err(|err| err.to_string())?;
        self.container_mut().children.push(XMLNode::Element(node));
        self.dirty = true;
        Ok(true)
    }

    /// Remove every entry with the given name (defends against duplicates
    /// introduced by hand edits). Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let container = self.container_mut();
        let before = container.children.len();
        container
            .children
            .retain(|node| Self::node_name(node) != Some(name));
        let removed = container.children.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn serialize(&self) -> std::result::Result<String, String> {
        let mut out = Vec::new();
        let config = EmitterConfig::new()
            .perform_indent(true)
            .write_document_declaration(false);
        self.root
            .write_with_config(&mut out, config)
            .map_err(|err| err.to_string())?;
        let mut text = String::from_utf8(out).map_err(|err| err.to_string())?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}

/// A located interpreter registry file.
///
/// Construction does no I/O; the document is loaded on first use and written
/// back only when a mutation actually happened, so no-op runs leave the file
/// untouched.
#[derive(Debug)]
pub struct IdeRegistry {
    path: PathBuf,
    document: Option<RegistryDocument>,
}

impl IdeRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: None,
        }
    }

    /// Search the platform's product roots for the newest installation whose
    /// directory name starts with `product_prefix` (case-insensitive) and
    /// which has a registry file. Directory names sort newest-first
    /// lexicographically (JetBrains encodes the version in the name).
    pub fn locate(product_prefix: &str) -> Option<PathBuf> {
        let roots = candidate_roots();
        locate_in(&roots, product_prefix)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document(&mut self) -> Result<&mut RegistryDocument> {
        if self.document.is_none() {
            let contents = fs::read_to_string(&self.path).map_err(|err| Error::RegistryIo {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
            let document =
                RegistryDocument::parse(&contents).map_err(|message| Error::RegistryIo {
                    path: self.path.clone(),
                    message,
                })?;
            self.document = Some(document);
        }
        Ok(self.document.as_mut().expect("just loaded"))
    }

    pub fn contains(&mut self, name: &str) -> Result<bool> {
        Ok(self.document()?.contains(name))
    }

    pub fn upsert(&mut self, name: &str, fragment: &str) -> Result<bool> {
        let path = self.path.clone();
        self.document()?
            .upsert(name, fragment)
            .map_err(|message| Error::RegistryIo { path, message })
    }

    pub fn remove(&mut self, name: &str) -> Result<bool> {
        Ok(self.document()?.remove(name))
    }

    /// Write the document back if and only if it is dirty.
    ///
    /// Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool> {
        let path = self.path.clone();
        let Some(document) = self.document.as_mut() else {
            return Ok(false);
        };
        if !document.is_dirty() {
            return Ok(false);
        }

        let contents = document
            .serialize()
            .map_err(|message| Error::RegistryIo {
                path: path.clone(),
                message,
            })?;
        fs::write(&path, contents)?;
        document.mark_clean();
        Ok(true)
    }
}

/// Fixed per-platform roots under which JetBrains products keep their
/// configuration directories.
fn candidate_roots() -> Vec<PathBuf> {
    let Ok(home) = xdg::home_dir() else {
        return Vec::new();
    };

    if cfg!(target_os = "macos") {
        vec![home.join("Library/Application Support/JetBrains")]
    } else {
        vec![home.join(".config/JetBrains")]
    }
}

fn locate_in(roots: &[PathBuf], product_prefix: &str) -> Option<PathBuf> {
    let prefix = product_prefix.to_lowercase();

    for root in roots {
        let Ok(entries) = fs::read_dir(root) else {
            continue;
        };

        let mut product_dirs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect();
        if product_dirs.is_empty() {
            continue;
        }

        product_dirs.sort();
        let newest = product_dirs.last().expect("non-empty");
        let candidate = root.join(newest).join(REGISTRY_SUFFIX);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

/// Recover the interpreter version recorded in a project's `misc.xml`.
///
/// Looks for the `ProjectRootManager` component whose `project-jdk-name`
/// has the registry entry shape `Python X.Y.Z (name)`.
pub fn extract_version_from_misc(contents: &str) -> Option<String> {
    let root = Element::parse(contents.as_bytes()).ok()?;
    let mut stack: Vec<&Element> = vec![&root];

    while let Some(element) = stack.pop() {
        if element.name == "component"
            && element.attributes.get("name").map(String::as_str) == Some("ProjectRootManager")
        {
            // a non-Python interpreter entry is not ours; keep scanning
            if let Some(version) = element
                .attributes
                .get("project-jdk-name")
                .and_then(|jdk_name| jdk_name.strip_prefix("Python "))
            {
                return version.split(' ').next().map(str::to_string);
            }
        }
        for node in &element.children {
            if let XMLNode::Element(child) = node {
                stack.push(child);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_REGISTRY: &str = r#"<application>
  <component name="ProjectJdkTable">
  </component>
</application>"#;

    fn fragment(name: &str) -> String {
        format!(
            r#"<jdk version="2"><name value="{name}" /><type value="Python SDK" /></jdk>"#
        )
    }

    #[test]
    fn test_upsert_first_write_wins() {
        let mut doc = RegistryDocument::parse(EMPTY_REGISTRY).unwrap();
        let name = entry_name("3.8.2", "billing");

        assert!(doc.upsert(&name, &fragment(&name)).unwrap());
        assert!(doc.is_dirty());

        // a second upsert with a different fragment is silently ignored
        let other = r#"<jdk version="2"><name value="Python 3.8.2 (billing)" /><homePath value="/elsewhere" /></jdk>"#;
        assert!(!doc.upsert(&name, other).unwrap());

        let serialized = doc.serialize().unwrap();
        assert!(serialized.contains("Python SDK"));
        assert!(!serialized.contains("/elsewhere"));
        assert_eq!(doc.entry_names(), vec![name]);
    }

    #[test]
    fn test_remove_drops_all_duplicates() {
        let mut doc = RegistryDocument::parse(EMPTY_REGISTRY).unwrap();
        let name = entry_name("3.8.2", "billing");
        doc.upsert(&name, &fragment(&name)).unwrap();

        // force a duplicate the way a hand edit could
        let mut dup = doc.clone();
        dup.container_mut().children.extend(
            RegistryDocument::parse(&format!(
                "<component>{}</component>",
                fragment(&name)
            ))
            .unwrap()
            .root
            .children,
        );
        assert_eq!(dup.entry_names().len(), 2);

        assert!(dup.remove(&name));
        assert!(dup.entry_names().is_empty());

        // removing again is a no-op
        assert!(!dup.remove(&name));
    }

    #[test]
    fn test_parse_rejects_document_without_container() {
        assert!(RegistryDocument::parse("<application></application>").is_err());
        assert!(RegistryDocument::parse("not xml at all").is_err());
    }

    #[test]
    fn test_registry_saves_only_when_dirty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jdk.table.xml");
        fs::write(&path, EMPTY_REGISTRY).unwrap();

        let name = entry_name("3.10.1", "api");
        let mut registry = IdeRegistry::open(&path);
        assert!(registry.upsert(&name, &fragment(&name)).unwrap());
        assert!(registry.save().unwrap());

        // second identical upsert leaves the document clean; nothing written
        let mut registry = IdeRegistry::open(&path);
        assert!(!registry.upsert(&name, &fragment(&name)).unwrap());
        assert!(!registry.save().unwrap());

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("3.10.1").count(), 1);
    }

    #[test]
    fn test_registry_remove_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jdk.table.xml");
        fs::write(&path, EMPTY_REGISTRY).unwrap();

        let name = entry_name("3.10.1", "api");
        let mut registry = IdeRegistry::open(&path);
        registry.upsert(&name, &fragment(&name)).unwrap();
        registry.save().unwrap();

        let mut registry = IdeRegistry::open(&path);
        assert!(registry.remove(&name).unwrap());
        assert!(registry.save().unwrap());

        let mut registry = IdeRegistry::open(&path);
        assert!(!registry.contains(&name).unwrap());
    }

    #[test]
    fn test_malformed_registry_is_registry_io_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jdk.table.xml");
        fs::write(&path, "<application><component name=").unwrap();

        let mut registry = IdeRegistry::open(&path);
        let result = registry.contains("anything");
        assert!(matches!(result, Err(Error::RegistryIo { .. })));
    }

    #[test]
    fn test_locate_picks_newest_matching_product() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();

        for dir in ["PyCharm2023.3", "PyCharm2024.1", "IntelliJIdea2024.1"] {
            fs::create_dir_all(root.join(dir).join("options")).unwrap();
        }
        fs::write(
            root.join("PyCharm2024.1").join(REGISTRY_SUFFIX),
            EMPTY_REGISTRY,
        )
        .unwrap();

        let located = locate_in(&[root.clone()], "pycharm").unwrap();
        assert_eq!(located, root.join("PyCharm2024.1").join(REGISTRY_SUFFIX));
    }

    #[test]
    fn test_locate_skips_root_when_newest_has_no_registry_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();

        // only the older product dir carries a registry file
        fs::create_dir_all(root.join("PyCharm2023.3/options")).unwrap();
        fs::write(
            root.join("PyCharm2023.3").join(REGISTRY_SUFFIX),
            EMPTY_REGISTRY,
        )
        .unwrap();
        fs::create_dir_all(root.join("PyCharm2024.1/options")).unwrap();

        assert!(locate_in(&[root], "PyCharm").is_none());
    }

    #[test]
    fn test_locate_without_match() {
        let temp = TempDir::new().unwrap();
        assert!(locate_in(&[temp.path().to_path_buf()], "PyCharm").is_none());
        assert!(locate_in(&[PathBuf::from("/nonexistent-root")], "PyCharm").is_none());
    }

    #[test]
    fn test_extract_version_from_misc() {
        let misc = r#"<project version="4">
  <component name="ProjectRootManager" version="2" project-jdk-name="Python 3.9.7 (billing)" project-jdk-type="Python SDK" />
</project>"#;
        assert_eq!(
            extract_version_from_misc(misc).as_deref(),
            Some("3.9.7")
        );

        let non_python = r#"<project><component name="ProjectRootManager" project-jdk-name="corretto-17" /></project>"#;
        assert_eq!(extract_version_from_misc(non_python), None);

        assert_eq!(extract_version_from_misc("<project />"), None);
    }
}
