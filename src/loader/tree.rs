//! Markup-tree loader.
//!
//! Each mapping is walked once over the nodes its root path selects or, when
//! loop variables are declared, once per variable combination with the root
//! path rendered from that combination. A root that selects nothing aborts
//! the run.

use crate::loader::context::ExtractionContext;
use crate::loader::error::LoaderError;
use crate::loader::expand::combinations;
use crate::loader::mapping::TreeMapping;
use crate::loader::summary::{LoadSummary, MappingSummary};
use crate::loader::walker::MappingRun;
use crate::loader::Loader;
use crate::service::Service;
use crate::xml::{ElementPath, XmlDocument};
use indexmap::IndexMap;
use std::path::Path;

/// Loader for markup documents
#[derive(Debug, Clone)]
pub struct TreeLoader {
    document: XmlDocument,
    source: String,
    namespaces: IndexMap<String, String>,
    mappings: Vec<TreeMapping>,
}

impl TreeLoader {
    pub fn new(document: XmlDocument) -> Self {
        Self {
            document,
            source: "<inline>".to_string(),
            namespaces: IndexMap::new(),
            mappings: Vec::new(),
        }
    }

    /// Parse the document at `path`
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let mut loader = Self::new(XmlDocument::parse_file(path)?);
        loader.source = path.display().to_string();
        Ok(loader)
    }

    pub fn parse_str(xml: &str) -> Result<Self, LoaderError> {
        Ok(Self::new(XmlDocument::parse_str(xml)?))
    }

    /// Prefix map used when compiling root paths
    pub fn namespaces(mut self, namespaces: IndexMap<String, String>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn namespace_map(&self) -> &IndexMap<String, String> {
        &self.namespaces
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Validate and add a mapping
    pub fn add_mapping(&mut self, mapping: TreeMapping) -> Result<(), LoaderError> {
        mapping.validate()?;
        self.mappings.push(mapping);
        Ok(())
    }

    pub fn mappings(&self) -> &[TreeMapping] {
        &self.mappings
    }

    fn run_mapping(
        &self,
        service: &mut dyn Service,
        tree: &TreeMapping,
    ) -> Result<MappingSummary, LoaderError> {
        let mut run = MappingRun::start(service, &tree.mapping)?;

        if tree.loops.is_empty() {
            self.walk_root(&mut run, tree, &ExtractionContext::empty())?;
        } else {
            let combos = combinations(self.document.root(), &tree.loops);
            run.summary_mut().combinations = combos.len();
            tracing::debug!(
                "{} combination(s) for {}",
                combos.len(),
                tree.mapping.action().display_name()
            );

            for (pass, combination) in combos.into_iter().enumerate() {
                let ctx = ExtractionContext::with_combination(combination, pass);
                self.walk_root(&mut run, tree, &ctx)?;
            }
        }

        run.finish()
    }

    fn walk_root(
        &self,
        run: &mut MappingRun<'_>,
        tree: &TreeMapping,
        ctx: &ExtractionContext,
    ) -> Result<(), LoaderError> {
        let action = tree.mapping.action().display_name();
        let root = tree
            .root
            .render(ctx.combination())
            .map_err(|message| LoaderError::invalid(&action, message))?;
        let path = ElementPath::parse_with_namespaces(&root, &self.namespaces).map_err(|source| {
            LoaderError::Path {
                action: action.clone(),
                path: root.clone(),
                source,
            }
        })?;

        let nodes = path.find_all(self.document.root());
        if nodes.is_empty() {
            return Err(LoaderError::RootNotFound { action, root });
        }
        tracing::debug!(
            "Pass {} over '{}' ({} node(s)) for {}",
            ctx.pass(),
            root,
            nodes.len(),
            action
        );

        run.walk(nodes, ctx)?;
        run.summary_mut().passes += 1;
        Ok(())
    }
}

impl Loader for TreeLoader {
    fn run(&mut self, service: &mut dyn Service) -> Result<LoadSummary, LoaderError> {
        tracing::info!(
            "Loading {} with {} mapping(s)",
            self.source,
            self.mappings.len()
        );

        let mut summary = LoadSummary::start();
        for tree in &self.mappings {
            summary.mappings.push(self.run_mapping(service, tree)?);
        }
        Ok(summary.finish())
    }

    fn validate(&self) -> Result<(), LoaderError> {
        for tree in &self.mappings {
            tree.validate()?;
            if !tree.root.has_slots() {
                let action = tree.mapping.action().display_name();
                ElementPath::parse_with_namespaces(tree.root.as_str(), &self.namespaces).map_err(
                    |source| LoaderError::Path {
                        action,
                        path: tree.root.to_string(),
                        source,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}
