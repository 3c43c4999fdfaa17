//! Snapshot tests
//!
//! Resolve small configurations end to end and compare the serialized result.

use tfscan::documents::Documents;
use tfscan::evaluator::{Evaluation, Evaluator};
use tfscan::graph::Graph;
use tfscan::module::{DirectoryModules, MemoryModules, ModuleLoader};
use tfscan::query::ResolvedBlock;
use tfscan::value::Value;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFSCAN_LOG"))
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve(
    documents: &Documents,
    loader: &dyn ModuleLoader,
    workspace: &str,
) -> (Vec<ResolvedBlock>, Evaluation) {
    init_logging();

    let mut graph = Graph::default();
    let mut evaluator = Evaluator::new(
        &mut graph,
        loader,
        ".",
        documents.parsed_blocks(),
        Default::default(),
    );
    evaluator.set_workspace(workspace);
    let evaluation = evaluator.evaluate_all();

    let blocks = evaluation
        .blocks
        .iter()
        .map(|id| graph.get(*id).resolved())
        .collect();
    (blocks, evaluation)
}

#[test]
fn dynamic_blocks() {
    let documents = tfscan::documents! {
        "main.tf" => r#"variable "ports" {
  default = [22, 443]
}

resource "aws_security_group" "web" {
  name = "web-${terraform.workspace}"

  dynamic "ingress" {
    for_each = var.ports
    content {
      from_port = ingress.value
    }
  }
}
"#
    };

    let (blocks, _) = resolve(&documents, &MemoryModules::default(), "prod");

    insta::assert_json_snapshot!(blocks, @r###"
    [
      {
        "reference": "var.ports",
        "type": "variable",
        "labels": [
          "ports"
        ],
        "range": {
          "filename": "main.tf",
          "start_line": 1,
          "end_line": 3
        },
        "attributes": {
          "default": [
            22,
            443
          ]
        }
      },
      {
        "reference": "aws_security_group.web",
        "type": "resource",
        "labels": [
          "aws_security_group",
          "web"
        ],
        "range": {
          "filename": "main.tf",
          "start_line": 5,
          "end_line": 14
        },
        "attributes": {
          "name": "web-prod"
        },
        "blocks": [
          {
            "reference": "ingress",
            "type": "ingress",
            "labels": [],
            "range": {
              "filename": "main.tf",
              "start_line": 10,
              "end_line": 12
            },
            "attributes": {
              "from_port": 22
            }
          },
          {
            "reference": "ingress",
            "type": "ingress",
            "labels": [],
            "range": {
              "filename": "main.tf",
              "start_line": 10,
              "end_line": 12
            },
            "attributes": {
              "from_port": 443
            }
          }
        ]
      }
    ]
    "###);
}

#[test]
fn module_outputs_and_diagnostics() {
    let loader = MemoryModules::default().with(
        "./queue",
        &tfscan::documents! {r#"
        variable "name" {}
        variable "retention" {
          default = 345600
        }

        resource "aws_sqs_queue" "q" {
          name                      = var.name
          message_retention_seconds = var.retention
        }

        output "queue" {
          value = {
            name      = aws_sqs_queue.q.name
            retention = aws_sqs_queue.q.message_retention_seconds
          }
        }
        "#},
    );

    let documents = tfscan::documents! {r#"
    module "orders" {
      for_each = toset(["created", "shipped"])
      source   = "./queue"
      name     = "orders-${each.key}"
    }

    module "legacy" {
      source = "git::https://example.com/legacy.git"
    }

    output "queues" {
      value = { for key, queue in module.orders : key => queue.queue.name }
    }
    "#};

    let (blocks, evaluation) = resolve(&documents, &loader, "default");

    let references: Vec<_> = blocks.iter().map(|block| block.reference.as_str()).collect();
    insta::assert_json_snapshot!(references, @r###"
    [
      "module.orders[\"created\"]",
      "module.orders[\"shipped\"]",
      "module.legacy",
      "output.queues",
      "module.orders[\"created\"].var.name",
      "module.orders[\"created\"].var.retention",
      "module.orders[\"created\"].aws_sqs_queue.q",
      "module.orders[\"created\"].output.queue",
      "module.orders[\"shipped\"].var.name",
      "module.orders[\"shipped\"].var.retention",
      "module.orders[\"shipped\"].aws_sqs_queue.q",
      "module.orders[\"shipped\"].output.queue"
    ]
    "###);

    insta::assert_json_snapshot!(evaluation.outputs, @r###"
    {
      "queues": {
        "created": "orders-created",
        "shipped": "orders-shipped"
      }
    }
    "###);

    let diagnostics: Vec<_> = evaluation
        .diagnostics
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        diagnostics,
        vec![r#"module.legacy: Module source "git::https://example.com/legacy.git" not found"#]
    );
}

#[test]
fn directory_with_modules_and_tfvars() {
    let root = tempfile::tempdir().expect("temp dir");
    let module = root.path().join("modules").join("bucket");
    std::fs::create_dir_all(&module).expect("module dir");

    std::fs::write(
        root.path().join("main.tf"),
        r#"
        variable "env" {}

        module "logs" {
          source = "./modules/bucket"
          name   = "logs-${var.env}"
        }

        resource "aws_s3_bucket_policy" "logs" {
          bucket = module.logs.id
        }
        "#,
    )
    .expect("main.tf");
    std::fs::write(root.path().join("terraform.tfvars"), r#"env = "dev""#).expect("tfvars");
    std::fs::write(
        module.join("main.tf"),
        r#"
        variable "name" {}

        resource "aws_s3_bucket" "b" {
          bucket = var.name
        }

        output "id" {
          value = aws_s3_bucket.b.bucket
        }
        "#,
    )
    .expect("module main.tf");

    init_logging();
    let mut documents = Documents::default();
    documents.load_directory(root.path()).expect("loads");
    let variables = tfscan::documents::load_default_variables(root.path()).expect("tfvars");

    let mut graph = Graph::default();
    let loader = DirectoryModules::new(root.path());
    let evaluation = Evaluator::new(
        &mut graph,
        &loader,
        root.path(),
        documents.parsed_blocks(),
        variables,
    )
    .evaluate_all();

    let policy = evaluation
        .blocks
        .iter()
        .map(|id| graph.get(*id))
        .find(|block| block.reference() == "aws_s3_bucket_policy.logs")
        .expect("policy resolved");
    assert_eq!(
        policy.attribute("bucket").expect("bucket").value(),
        Value::from("logs-dev")
    );

    let bucket = evaluation
        .blocks
        .iter()
        .map(|id| graph.get(*id))
        .find(|block| block.full_name() == "module.logs.aws_s3_bucket.b")
        .expect("module bucket resolved");
    assert!(bucket.range().filename.as_ref().is_some_and(|path| path.ends_with("main.tf")));
    assert!(evaluation.diagnostics.is_empty());
}
