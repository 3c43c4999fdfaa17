//! resolution of a module's blocks to fixpoint
//!
//! An [Evaluator] owns one module: its root context, its blocks and the module instances it
//! calls. Resolution is a loop of binding steps; each step evaluates every block against what
//! previous steps bound and stops once the root bindings no longer change. HCL gives no
//! dependency order for free, so repetition is what resolves chains like
//! `local.c -> local.b -> var.a`.
//!
//! ```text
//! pass 1 -> expand (count, for_each, dynamic) -> load modules -> pass 2 (+ module recursion)
//! ```
use crate::block::{BlockId, InstanceKey, ParsedBlock};
use crate::context::{ContextId, Contexts};
use crate::expand;
use crate::graph::Graph;
use crate::module::{
    ModuleDiagnostic, ModuleError, ModuleKey, ModuleLoader, ModuleRequest, VisitedModules,
};
use crate::value::{Object, Value};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::PathBuf;

/// Upper bound for binding steps per pass and module
pub const MAX_CONTEXT_ITERATIONS: usize = 32;

/// Meta arguments of a `module` block, not passed as input variables
const MODULE_META_ARGUMENTS: &[&str] = &[
    "source",
    "version",
    "count",
    "for_each",
    "providers",
    "depends_on",
];

#[derive(Debug)]
pub struct Evaluation {
    /// Resolved blocks of the module and of every module it calls, flattened
    pub blocks: Vec<BlockId>,
    /// Root context of the evaluated module
    pub context: ContextId,
    pub outputs: Value,
    pub visited: VisitedModules,
    pub diagnostics: Vec<ModuleDiagnostic>,
}

#[derive(Debug)]
struct ModuleInstance {
    block: BlockId,
    path: PathBuf,
    /// Taken once the module is evaluated
    blocks: Option<Vec<ParsedBlock>>,
    outputs: Option<Value>,
}

pub struct Evaluator<'a> {
    graph: &'a mut Graph,
    loader: &'a dyn ModuleLoader,
    context: ContextId,
    blocks: Vec<BlockId>,
    modules: Vec<ModuleInstance>,
    module_blocks: Vec<BlockId>,
    /// Addresses of templates replaced by expansion, with their empty aggregate
    templates: Vec<(Vec<String>, Value)>,
    visited: VisitedModules,
    input_vars: Object,
    module_path: PathBuf,
    /// Address of the calling block, `None` for the root module
    address: Option<String>,
    workspace: Option<String>,
    diagnostics: Vec<ModuleDiagnostic>,
}

impl<'a> Evaluator<'a> {
    /// Evaluator for a root module
    ///
    /// `module_path` is the directory local module sources are resolved against and
    /// `input_vars` overrides variable defaults by name.
    pub fn new(
        graph: &'a mut Graph,
        loader: &'a dyn ModuleLoader,
        module_path: impl Into<PathBuf>,
        blocks: Vec<ParsedBlock>,
        input_vars: Object,
    ) -> Self {
        Self::for_module(graph, loader, module_path.into(), blocks, input_vars, None)
    }

    fn for_module(
        graph: &'a mut Graph,
        loader: &'a dyn ModuleLoader,
        module_path: PathBuf,
        parsed: Vec<ParsedBlock>,
        input_vars: Object,
        address: Option<String>,
    ) -> Self {
        let context = graph.contexts_mut().new_root();
        graph.contexts_mut().set_by_dot(
            context,
            "path.module",
            module_path.display().to_string().into(),
        );

        let blocks = parsed
            .into_iter()
            .map(|parsed| {
                let block_context = graph.contexts_mut().new_child(context);
                graph.insert(parsed, block_context, address.as_deref())
            })
            .collect();

        Self {
            graph,
            loader,
            context,
            blocks,
            modules: vec![],
            module_blocks: vec![],
            templates: vec![],
            visited: VisitedModules::default(),
            input_vars,
            module_path,
            address,
            workspace: None,
            diagnostics: vec![],
        }
    }

    /// Start from the ledger of modules the caller already evaluated
    pub fn with_visited(mut self, visited: VisitedModules) -> Self {
        self.visited = visited;
        self
    }

    /// Bind `terraform.workspace`; modules inherit it
    pub fn set_workspace(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.graph
            .contexts_mut()
            .set_by_dot(self.context, "terraform.workspace", name.clone().into());
        self.workspace = Some(name);
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    #[tracing::instrument(skip_all, fields(module = self.address.as_deref().unwrap_or("root")))]
    pub fn evaluate_all(mut self) -> Evaluation {
        self.evaluate_until_settled();

        let templates = std::mem::take(&mut self.blocks);
        self.blocks = expand::expand_blocks(self.graph, &templates);
        self.record_templates(&templates);
        tracing::debug!(blocks = self.blocks.len(), "expanded");

        self.load_modules();
        self.evaluate_until_settled();

        let outputs = self.export_outputs();
        let mut blocks = self.blocks;
        blocks.extend(self.module_blocks);

        Evaluation {
            blocks,
            context: self.context,
            outputs,
            visited: self.visited,
            diagnostics: self.diagnostics,
        }
    }

    /// Object of all resolved `output` values
    pub fn export_outputs(&self) -> Value {
        let mut outputs = Value::object();
        for &id in &self.blocks {
            let block = self.graph.block(id);
            if block.block_type != "output" {
                continue;
            }
            let Some(name) = block.type_label() else {
                continue;
            };
            match self.graph.attribute_value(id, "value") {
                Some(value) if value.is_known() => outputs.set(&[name], value),
                _ => tracing::debug!(output = name, "unresolved output"),
            }
        }
        outputs
    }

    fn evaluate_until_settled(&mut self) {
        let mut last: Option<Object> = None;
        let mut force_modules = false;

        for iteration in 1..=MAX_CONTEXT_ITERATIONS {
            self.evaluate_step(force_modules);

            let current = self.graph.contexts().inner(self.context).clone();
            if last.as_ref() == Some(&current) {
                // modules waiting for unknown inputs get evaluated with what there is
                if !force_modules && self.has_pending_modules() {
                    force_modules = true;
                    continue;
                }
                tracing::debug!(iteration, "settled");
                return;
            }
            last = Some(current);
        }

        tracing::debug!(
            iterations = MAX_CONTEXT_ITERATIONS,
            "stopped without settling"
        );
        if self.has_pending_modules() {
            self.evaluate_step(true);
        }
    }

    /// Remember the address of every count/for_each template replaced by expansion
    ///
    /// The address is rebound to an empty list or object in each step, so a template that
    /// produced no instances does not keep the attributes bound before expansion.
    fn record_templates(&mut self, templates: &[BlockId]) {
        let remaining: HashSet<BlockId> = self.blocks.iter().copied().collect();

        for &id in templates {
            if remaining.contains(&id) {
                continue;
            }
            let block = self.graph.block(id);
            let path = match (block.block_type.as_str(), block.type_label(), block.name_label()) {
                ("resource", Some(type_label), Some(name)) => vec![type_label, name],
                ("module", Some(name), _) => vec!["module", name],
                _ => continue,
            };
            let empty = match self.graph.attribute_value(id, "count") {
                Some(Value::Number(_)) => Value::List(vec![]),
                _ => Value::object(),
            };
            self.templates
                .push((path.into_iter().map(ToString::to_string).collect(), empty));
        }
    }

    fn evaluate_step(&mut self, force_modules: bool) {
        let root = self.context;
        let mut instances = Instances::default();
        for (path, empty) in &self.templates {
            instances.seed(path.clone(), empty.clone());
        }

        for &id in &self.blocks {
            let block = self.graph.block(id);
            let Some(label) = block.type_label().map(ToString::to_string) else {
                if block.block_type == "locals" {
                    for (name, value) in self.graph.attribute_values(id) {
                        self.graph
                            .contexts_mut()
                            .set(root, &["local", name.as_str()], value);
                    }
                }
                continue;
            };

            match block.block_type.as_str() {
                "variable" => {
                    let value = match self.input_vars.get(&label) {
                        Some(value) if value.is_known() => Some(value.clone()),
                        _ => self.graph.attribute_value(id, "default"),
                    };
                    match value {
                        Some(value) if value.is_known() => {
                            tracing::trace!(variable = %label, %value, "bind");
                            self.graph
                                .contexts_mut()
                                .set(root, &["var", label.as_str()], value);
                        }
                        _ => tracing::trace!(variable = %label, "unresolved variable"),
                    }
                }
                "provider" => {
                    let value = self.graph.values(id);
                    self.graph
                        .contexts_mut()
                        .set(root, &["provider", label.as_str()], value);
                }
                block_type @ ("resource" | "data") => {
                    let Some(name) = block.name_label().map(ToString::to_string) else {
                        continue;
                    };
                    let mut path = vec![];
                    if block_type == "data" {
                        path.push("data".to_string());
                    }
                    path.push(label);

                    let instance = block.instance.clone();
                    let value = self.graph.values(id);
                    instances.bind(
                        self.graph.contexts_mut(),
                        root,
                        path,
                        &name,
                        instance.as_ref(),
                        value,
                    );
                }
                "output" => match self.graph.attribute_value(id, "value") {
                    Some(value) if value.is_known() => {
                        self.graph
                            .contexts_mut()
                            .set(root, &["output", label.as_str()], value);
                    }
                    _ => tracing::trace!(output = %label, "unresolved output"),
                },
                _ => {}
            }
        }

        self.evaluate_modules(force_modules);
        for module in &self.modules {
            let Some(outputs) = &module.outputs else {
                continue;
            };
            let block = self.graph.block(module.block);
            let Some(name) = block.type_label().map(ToString::to_string) else {
                continue;
            };
            let instance = block.instance.clone();
            instances.bind(
                self.graph.contexts_mut(),
                root,
                vec!["module".to_string()],
                &name,
                instance.as_ref(),
                outputs.clone(),
            );
        }

        instances.aggregate(self.graph.contexts_mut(), root);
    }

    /// Resolve the source of every `module` block through the loader
    fn load_modules(&mut self) {
        for &id in &self.blocks {
            let block = self.graph.block(id);
            if block.block_type != "module" {
                continue;
            }
            let name = block.type_label().unwrap_or_default().to_string();
            let address = block.full_name();

            let source = match self.graph.attribute_value(id, "source") {
                Some(Value::String(source)) => source,
                _ => {
                    tracing::warn!(module = %address, "module without static source");
                    self.diagnostics
                        .push(ModuleDiagnostic::new(address, ModuleError::MissingSource));
                    continue;
                }
            };

            match self
                .loader
                .load(&ModuleRequest::new(&name, &source, &self.module_path))
            {
                Ok(loaded) => {
                    tracing::debug!(module = %address, path=%loaded.path.display(), "module loaded");
                    self.modules.push(ModuleInstance {
                        block: id,
                        path: loaded.path,
                        blocks: Some(loaded.blocks),
                        outputs: None,
                    });
                }
                Err(error) => {
                    tracing::warn!(module = %address, %error, "unable to load module");
                    self.diagnostics.push(ModuleDiagnostic::new(address, error));
                }
            }
        }
    }

    fn has_pending_modules(&self) -> bool {
        self.modules.iter().any(|module| module.blocks.is_some())
    }

    /// Evaluate every loaded module not evaluated yet
    ///
    /// Unless `force` is set a module waits until all its inputs are known.
    fn evaluate_modules(&mut self, force: bool) {
        for index in 0..self.modules.len() {
            let id = self.modules[index].block;
            if self.modules[index].blocks.is_none() {
                continue;
            }

            let inputs: Object = self
                .graph
                .attribute_values(id)
                .into_iter()
                .filter(|(name, _)| !MODULE_META_ARGUMENTS.contains(&name.as_str()))
                .collect();
            if !force && !inputs.values().all(Value::is_known) {
                continue;
            }

            let block = self.graph.block(id);
            let address = block.full_name();
            let key = ModuleKey::new(
                block.type_label().unwrap_or_default().to_string(),
                self.modules[index].path.clone(),
                address.clone(),
            );
            let Some(blocks) = self.modules[index].blocks.take() else {
                continue;
            };
            if !self.visited.insert(key) {
                tracing::debug!(module = %address, "module already evaluated");
                continue;
            }

            let mut child = Evaluator::for_module(
                &mut *self.graph,
                self.loader,
                self.modules[index].path.clone(),
                blocks,
                inputs,
                Some(address),
            )
            .with_visited(self.visited.clone());
            if let Some(workspace) = &self.workspace {
                child.set_workspace(workspace.clone());
            }

            let evaluation = child.evaluate_all();
            self.visited.merge(evaluation.visited);
            self.diagnostics.extend(evaluation.diagnostics);
            self.module_blocks.extend(evaluation.blocks);
            self.modules[index].outputs = Some(evaluation.outputs);
        }
    }
}

/// Values of count and for_each instances, collected during one step
///
/// Each instance is bound under its own label right away. The aggregate under the template's
/// name (a list for count, an object for for_each) is bound once all instances are known.
#[derive(Default)]
struct Instances {
    groups: IndexMap<Vec<String>, Value>,
}

impl Instances {
    fn bind(
        &mut self,
        contexts: &mut Contexts,
        root: ContextId,
        mut path: Vec<String>,
        name: &str,
        instance: Option<&InstanceKey>,
        value: Value,
    ) {
        let Some(instance) = instance else {
            path.push(name.to_string());
            contexts.set(root, path.as_slice(), value);
            return;
        };

        let mut instance_path = path.clone();
        instance_path.push(format!("{name}{instance}"));
        contexts.set(root, instance_path.as_slice(), value.clone());

        path.push(name.to_string());
        let group = self.groups.entry(path).or_insert_with(|| match instance {
            InstanceKey::Index(_) => Value::List(vec![]),
            InstanceKey::Key(_) => Value::object(),
        });
        match (group, instance) {
            (Value::List(list), InstanceKey::Index(index)) => {
                if list.len() <= *index {
                    list.resize(index + 1, Value::Null);
                }
                list[*index] = value;
            }
            (Value::Object(object), InstanceKey::Key(_)) => {
                object.insert(instance.as_key(), value);
            }
            _ => tracing::debug!(name, %instance, "mixed count and for_each instances"),
        }
    }

    fn seed(&mut self, path: Vec<String>, empty: Value) {
        self.groups.entry(path).or_insert(empty);
    }

    fn aggregate(self, contexts: &mut Contexts, root: ContextId) {
        for (path, value) in self.groups {
            contexts.set(root, path.as_slice(), value);
        }
    }
}
