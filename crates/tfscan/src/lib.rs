//! # tfscan - terraform configuration resolver
//!
//! Resolves a terraform configuration into the flat list of blocks `terraform plan` would see,
//! as far as that is possible without providers or state. Rule checks run on the result.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfscan` works internally.
//!
//! ### Loading files
//!
//! Every `*.tf` file of a directory is parsed with [hcl_edit] into a `body`. [documents::Documents]
//! keeps the root blocks together with their source so that byte spans can be turned into line
//! numbers ([block::SourceRange]). Root attributes are not valid terraform and are skipped.
//! The evaluator consumes [block::ParsedBlock] trees, which only keep what it needs: type,
//! labels, attributes as [hcl::Expression] and nested blocks.
//!
//! ### Blocks and contexts
//!
//! All blocks of a run live in a [graph::Graph] and are addressed by [block::BlockId].
//! Every block is bound to a context ([context::Contexts]), a node in a tree of variable
//! scopes:
//!
//! ```text
//! root            var.*, local.*, aws_s3_bucket.*, module.*, terraform.workspace
//! ├── block       (empty for most blocks)
//! │   └── clone   count.index / each.key / each.value
//! │       └── dynamic instance   <iterator>.key / <iterator>.value
//! ```
//!
//! A lookup falls through to the parent, so an expression sees its instance bindings and
//! everything its module bound.
//!
//! ### Evaluation
//!
//! HCL has no evaluation order, so [evaluator::Evaluator] simply repeats a binding step until
//! the root bindings stop changing (at most [evaluator::MAX_CONTEXT_ITERATIONS] times).
//! Expressions that can't be resolved yet evaluate to [value::Value::Unknown], which is never
//! an error.
//!
//! ```hcl
//! locals {
//!   name = "${local.prefix}-logs"   # resolved in the second step
//!   prefix = var.project            # resolved in the first step
//! }
//! ```
//!
//! Once settled, blocks are expanded ([expand]): `count` and `for_each` clone resources and
//! modules, `dynamic` blocks become nested blocks. Then every `module` block is resolved through
//! a [module::ModuleLoader] and evaluated by its own evaluator with a fresh root context. Only
//! the module's outputs are bound in the caller (`module.<name>`).
//!
//! ### Output
//!
//! [evaluator::Evaluation::blocks] lists every resolved block including those of all modules.
//! [query::BlockRef] and [query::AttributeRef] are the read-only interface for rule checks,
//! [query::ResolvedBlock] is the serializable form used by the CLI.
//!
pub mod block;
pub mod context;
pub mod documents;
pub mod evaluator;
pub mod expand;
mod functions;
pub mod graph;
pub mod module;
pub mod query;
pub mod value;
mod visit;
