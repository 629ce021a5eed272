//! Integration tests for the delimited-text loader

use dynaload::loader::{
    CombinationElement, DelimitedLoader, Element, FixedElement, Loader, LoaderError, Mapping,
    ValueElement,
};
use dynaload::service::{MemoryService, NdjsonService, Operation, Service, ServiceError};
use dynaload::types::{
    Action, ComponentType, DataType, InstanceBatches, Labels, Topology, Value,
};
use dynaload::TransformRegistry;
use std::collections::HashMap;
use std::io::Write;

/// Store that can be told to refuse labels or batches
#[derive(Default)]
struct FlakyService {
    store: MemoryService,
    refuse_actions: bool,
    refuse_labels: bool,
    refuse_batches: bool,
}

impl Service for FlakyService {
    fn create_action(&mut self, action: &Action) -> Result<Action, ServiceError> {
        if self.refuse_actions {
            return Err(ServiceError::Rejected {
                operation: Operation::CreateAction,
                message: "read-only store".to_string(),
            });
        }
        self.store.create_action(action)
    }

    fn create_topology(&mut self, topology: &Topology) -> Result<Topology, ServiceError> {
        self.store.create_topology(topology)
    }

    fn create_labels(&mut self, labels: &Labels) -> Result<bool, ServiceError> {
        if self.refuse_labels {
            return Err(ServiceError::Unavailable("labels offline".to_string()));
        }
        self.store.create_labels(labels)
    }

    fn batch_create_instances(&mut self, batches: &InstanceBatches) -> Result<bool, ServiceError> {
        if self.refuse_batches {
            return Ok(false);
        }
        self.store.batch_create_instances(batches)
    }
}

fn column(index: usize, component: ComponentType, label: &str) -> Element {
    ValueElement::column(index, DataType::String, component)
        .label(label)
        .into()
}

fn strict(index: usize, component: ComponentType) -> Element {
    ValueElement::column(index, DataType::String, component)
        .allow_void(false)
        .into()
}

#[test]
fn test_header_skipped_and_single_shape() {
    let mut loader =
        DelimitedLoader::from_text("person,city\nada,london\nalan,wilmslow\n").header_count(1);
    loader
        .add_mapping(Mapping::new(
            Action::named("lives_in"),
            vec![
                column(0, ComponentType::Who, "person"),
                column(1, ComponentType::Where, "city"),
            ],
        ))
        .unwrap();

    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();
    let run = &summary.mappings[0];

    assert_eq!(run.records, 2);
    assert_eq!(run.topologies_created, 1);
    assert_eq!(service.calls().create_topology, 1);
    assert_eq!(service.calls().create_labels, 1);
    assert_eq!(service.calls().batch_sizes, vec![2]);

    let instance = &service.instances()[0];
    assert_eq!(instance.values, vec![Value::from("ada"), Value::from("london")]);
    let labels = service
        .labels_for(instance.action.id.unwrap(), instance.topology.id.unwrap())
        .unwrap();
    let values: Vec<&str> = labels.labels().iter().map(|l| l.value.as_str()).collect();
    assert_eq!(values, vec!["person", "city"]);
}

#[test]
fn test_missing_value_becomes_void() {
    let mut loader = DelimitedLoader::from_text("ada,london\nalan,\ngrace\n");
    loader
        .add_mapping(
            Mapping::new(
                Action::named("lives_in"),
                vec![
                    column(0, ComponentType::Who, "person"),
                    column(1, ComponentType::Where, "city"),
                ],
            )
            .fallback(vec![
                column(0, ComponentType::Who, "person"),
                FixedElement::new(Value::from("fallback"), ComponentType::What).into(),
            ]),
        )
        .unwrap();

    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();

    assert_eq!(summary.mappings[0].accepted_primary, 3);
    assert_eq!(summary.mappings[0].accepted_fallback, 0);
    assert_eq!(service.instances()[1].values[1], Value::Void);
    assert_eq!(service.instances()[2].values[1].data_type(), DataType::Void);
    assert_eq!(service.topology_count(), 1);
}

#[test]
fn test_intermediate_and_final_flushes() {
    let mut loader = DelimitedLoader::from_text("1,a\n2,b\n3,c\n4,d\n5,e\n");
    loader
        .add_mapping(
            Mapping::new(
                Action::named("pairs"),
                vec![strict(0, ComponentType::Who), strict(1, ComponentType::What)],
            )
            .batch_size(2),
        )
        .unwrap();

    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();

    assert_eq!(service.calls().batch_sizes, vec![2, 2, 1]);
    assert_eq!(summary.batches_pushed(), 3);
    assert_eq!(summary.instances_pushed(), 5);
}

#[test]
fn test_exporter_keeps_no_instances() {
    let text: String = (0..1000).map(|i| format!("p{},c{}\n", i, i % 7)).collect();
    let mut loader = DelimitedLoader::from_text(&text);
    loader
        .add_mapping(
            Mapping::new(
                Action::named("pairs"),
                vec![strict(0, ComponentType::Who), strict(1, ComponentType::What)],
            )
            .batch_size(10),
        )
        .unwrap();

    let mut service = NdjsonService::new(Vec::new());
    let summary = loader.run(&mut service).unwrap();
    let (store, output) = service.finish().unwrap();

    assert_eq!(summary.instances_pushed(), 1000);
    assert_eq!(store.calls().batch_create, 100);
    assert_eq!(store.calls().instances_received, 1000);
    assert!(store.calls().batch_sizes.is_empty());
    assert!(store.instances().is_empty());
    // action, topology, labels, then one line per batch
    assert_eq!(String::from_utf8(output).unwrap().lines().count(), 103);
}

#[test]
fn test_no_push_when_nothing_accepted() {
    let mut loader = DelimitedLoader::from_text("only\nsingle\n");
    loader
        .add_mapping(Mapping::new(
            Action::named("pairs"),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::What)],
        ))
        .unwrap();

    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();

    assert_eq!(summary.skipped(), 2);
    assert_eq!(service.calls().batch_create, 0);
    assert_eq!(service.calls().create_action, 1);
}

#[test]
fn test_fallback_and_distinct_shapes() {
    let mut loader = DelimitedLoader::from_text("ada,london,1815\nalan,,1912\n");
    loader
        .add_mapping(
            Mapping::new(
                Action::named("born"),
                vec![
                    strict(0, ComponentType::Who),
                    strict(1, ComponentType::Where),
                    ValueElement::column(2, DataType::Integer, ComponentType::When).into(),
                ],
            )
            .fallback(vec![
                strict(0, ComponentType::Who),
                ValueElement::column(2, DataType::Integer, ComponentType::When).into(),
            ]),
        )
        .unwrap();

    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();
    let run = &summary.mappings[0];

    assert_eq!(run.accepted_primary, 1);
    assert_eq!(run.accepted_fallback, 1);
    assert_eq!(run.topologies_created, 2);
    assert_eq!(service.instances()[1].values, vec![Value::from("alan"), Value::Integer(1912)]);
    assert_eq!(
        service.instances()[1].topology.sequence,
        vec![ComponentType::Who, ComponentType::When]
    );
}

#[test]
fn test_transforms_and_combinations() {
    let registry = TransformRegistry::with_builtins();
    let mut args = HashMap::new();
    args.insert("prefix".to_string(), serde_json::json!("city:"));
    let strip = registry.build("strip_prefix", &args).unwrap();
    let upper = registry.build("uppercase", &HashMap::new()).unwrap();

    let mut loader = DelimitedLoader::from_text("Ada,Lovelace,city:london\n");
    loader
        .add_mapping(Mapping::new(
            Action::named("named"),
            vec![
                CombinationElement::columns(&[0, 1], ComponentType::Who).into(),
                ValueElement::column(2, DataType::String, ComponentType::Where)
                    .transform(strip)
                    .transform(upper)
                    .into(),
            ],
        ))
        .unwrap();

    let mut service = MemoryService::new();
    loader.run(&mut service).unwrap();
    assert_eq!(
        service.instances()[0].values,
        vec![Value::from("Ada Lovelace"), Value::from("LONDON")]
    );
}

#[test]
fn test_source_reread_per_mapping() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "header").unwrap();
    writeln!(file, "ada,london").unwrap();
    writeln!(file, "alan,wilmslow").unwrap();

    let mut loader = DelimitedLoader::from_path(file.path()).header_count(1);
    for name in ["first", "second"] {
        loader
            .add_mapping(Mapping::new(
                Action::named(name),
                vec![strict(0, ComponentType::Who), strict(1, ComponentType::Where)],
            ))
            .unwrap();
    }

    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();

    assert_eq!(summary.mappings.len(), 2);
    assert_eq!(summary.mappings[1].records, 2);
    assert_eq!(summary.instances_pushed(), 4);
    // Same shape under two actions: the memo is per mapping, the store dedups.
    assert_eq!(service.calls().create_topology, 2);
    assert_eq!(service.topology_count(), 1);
}

#[test]
fn test_label_failure_is_not_fatal() {
    let mut loader = DelimitedLoader::from_text("ada,london\n");
    loader
        .add_mapping(Mapping::new(
            Action::named("lives_in"),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::Where)],
        ))
        .unwrap();

    let mut service = FlakyService {
        refuse_labels: true,
        ..FlakyService::default()
    };
    let summary = loader.run(&mut service).unwrap();

    assert_eq!(summary.mappings[0].label_failures, 1);
    assert_eq!(service.store.instances().len(), 1);
}

#[test]
fn test_refused_batch_aborts_run() {
    let mut loader = DelimitedLoader::from_text("ada,london\n");
    loader
        .add_mapping(Mapping::new(
            Action::named("lives_in"),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::Where)],
        ))
        .unwrap();

    let mut service = FlakyService {
        refuse_batches: true,
        ..FlakyService::default()
    };
    let err = loader.run(&mut service).unwrap_err();

    assert!(matches!(err, LoaderError::PushFailed { count: 1, .. }));
    assert!(service.store.instances().is_empty());
}

#[test]
fn test_unusable_action_rejected_before_any_call() {
    let mut loader = DelimitedLoader::from_text("a,b\n");
    let err = loader
        .add_mapping(Mapping::new(
            Action::default(),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::Where)],
        ))
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidMapping { .. }));

    loader
        .add_mapping(Mapping::new(
            Action::with_id(7),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::Where)],
        ))
        .unwrap();
    let mut service = MemoryService::new();
    let summary = loader.run(&mut service).unwrap();
    assert_eq!(summary.mappings[0].action_id, Some(7));
}

#[test]
fn test_failed_action_aborts_with_operation() {
    let mut loader = DelimitedLoader::from_text("a,b\n");
    loader
        .add_mapping(Mapping::new(
            Action::named("lives_in"),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::Where)],
        ))
        .unwrap();

    let mut service = FlakyService {
        refuse_actions: true,
        ..FlakyService::default()
    };
    let err = loader.run(&mut service).unwrap_err();

    assert_eq!(err.operation(), Some(Operation::CreateAction));
    assert_eq!(service.store.calls().create_topology, 0);
}
