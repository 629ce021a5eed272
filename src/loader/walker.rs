//! Record walker: turns records into queued instances for one mapping run.
//!
//! Per record the primary elements are attempted against a fresh
//! accumulator; when they reject the record, or produce fewer than two
//! positions, the fallback elements get one attempt of their own. Accepted
//! records are resolved to a memoized topology and queued on the pusher,
//! which flushes whenever the batch size is reached.

use crate::extraction::Extractor;
use crate::loader::context::ExtractionContext;
use crate::loader::element::{Accumulator, Element, Extraction};
use crate::loader::error::LoaderError;
use crate::loader::mapping::Mapping;
use crate::loader::memo::TopologyMemo;
use crate::loader::pusher::BatchPusher;
use crate::loader::summary::MappingSummary;
use crate::service::{Operation, Service};
use crate::types::{Action, Instance, Topology};

/// Outcome of running one element list against one record
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Accepted(Accumulator),
    Rejected(String),
}

/// Which element list produced an accepted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Primary,
    Fallback,
}

/// Run `elements` in order against `record`
pub fn attempt<R: Extractor + ?Sized>(
    elements: &[Element],
    record: &R,
    ctx: &ExtractionContext,
) -> Attempt {
    if elements.is_empty() {
        return Attempt::Rejected("no elements".to_string());
    }

    let mut acc = Accumulator::new();
    for element in elements {
        match element.extract(record, ctx, &mut acc) {
            Extraction::Appended(_) | Extraction::Declined => {}
            Extraction::Rejected(reason) => return Attempt::Rejected(reason),
        }
    }

    if acc.len() < 2 {
        return Attempt::Rejected(format!("degenerate shape with {} position(s)", acc.len()));
    }
    Attempt::Accepted(acc)
}

/// Primary attempt, then fallback attempt
pub fn evaluate<R: Extractor + ?Sized>(
    mapping: &Mapping,
    record: &R,
    ctx: &ExtractionContext,
) -> Result<(Pass, Accumulator), String> {
    match attempt(mapping.elements(), record, ctx) {
        Attempt::Accepted(acc) => Ok((Pass::Primary, acc)),
        Attempt::Rejected(primary) => match attempt(mapping.fallback_elements(), record, ctx) {
            Attempt::Accepted(acc) => Ok((Pass::Fallback, acc)),
            Attempt::Rejected(fallback) => Err(format!("{}; fallback: {}", primary, fallback)),
        },
    }
}

/// State of one mapping run: the resolved action, the topology memo, the
/// pending batch and the counters.
pub struct MappingRun<'a> {
    service: &'a mut dyn Service,
    mapping: &'a Mapping,
    action: Action,
    memo: TopologyMemo,
    pusher: BatchPusher,
    summary: MappingSummary,
}

impl<'a> MappingRun<'a> {
    /// Create (or resolve) the mapping's action and start the run
    pub fn start(service: &'a mut dyn Service, mapping: &'a Mapping) -> Result<Self, LoaderError> {
        let name = mapping.action().display_name();
        tracing::info!("Creating instances for: {}", name);

        let action = service
            .create_action(mapping.action())
            .map_err(|e| LoaderError::service(&name, Operation::CreateAction, e))?;

        let mut summary = MappingSummary::new(name);
        summary.action_id = action.id;

        Ok(Self {
            service,
            mapping,
            action,
            memo: TopologyMemo::new(),
            pusher: BatchPusher::new(mapping.batch_size_limit()),
            summary,
        })
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn summary_mut(&mut self) -> &mut MappingSummary {
        &mut self.summary
    }

    /// Walk a sequence of records in source order
    pub fn walk<R, I>(&mut self, records: I, ctx: &ExtractionContext) -> Result<(), LoaderError>
    where
        R: Extractor,
        I: IntoIterator<Item = R>,
    {
        for record in records {
            self.process(&record, ctx)?;
        }
        Ok(())
    }

    /// Handle one record: extract, resolve the topology, queue, maybe flush
    pub fn process<R: Extractor + ?Sized>(
        &mut self,
        record: &R,
        ctx: &ExtractionContext,
    ) -> Result<(), LoaderError> {
        self.summary.records += 1;

        let (pass, acc) = match evaluate(self.mapping, record, ctx) {
            Ok(accepted) => accepted,
            Err(reason) => {
                self.summary.skipped += 1;
                tracing::debug!(
                    "Skipping record {} of {}: {}",
                    self.summary.records,
                    self.summary.action,
                    reason
                );
                return Ok(());
            }
        };
        match pass {
            Pass::Primary => self.summary.accepted_primary += 1,
            Pass::Fallback => self.summary.accepted_fallback += 1,
        }

        let (components, values, labels) = acc.into_parts();
        let topology: Topology = self.memo.resolve(
            &mut *self.service,
            &self.action,
            &components,
            &labels,
            &mut self.summary,
        )?;

        let instance = Instance::new(self.action.clone(), topology, values);
        tracing::debug!("{}", instance);
        self.pusher.queue(instance);

        if self.pusher.is_full() {
            self.pusher.flush(&mut *self.service, &mut self.summary)?;
        }
        Ok(())
    }

    /// Push the remainder and return the counters
    pub fn finish(mut self) -> Result<MappingSummary, LoaderError> {
        self.pusher.flush(&mut *self.service, &mut self.summary)?;
        tracing::info!(
            "Finished {}: {} records, {} accepted ({} fallback), {} skipped, {} instances in {} batches",
            self.summary.action,
            self.summary.records,
            self.summary.accepted(),
            self.summary.accepted_fallback,
            self.summary.skipped,
            self.summary.instances_pushed,
            self.summary.batches_pushed
        );
        Ok(self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::element::{FixedElement, ValueElement};
    use crate::service::MemoryService;
    use crate::types::{ComponentType, DataType, Value};

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    fn strict(i: usize, component: ComponentType) -> Element {
        ValueElement::column(i, DataType::String, component)
            .allow_void(false)
            .into()
    }

    #[test]
    fn test_attempt_requires_two_positions() {
        let one = vec![strict(0, ComponentType::Who)];
        let ctx = ExtractionContext::empty();
        assert!(matches!(attempt(&one, &row(&["a"]), &ctx), Attempt::Rejected(_)));

        let two = vec![strict(0, ComponentType::Who), strict(1, ComponentType::What)];
        match attempt(&two, &row(&["a", "b"]), &ctx) {
            Attempt::Accepted(acc) => assert_eq!(acc.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declined_optional_does_not_count() {
        let elements = vec![
            strict(0, ComponentType::Who),
            ValueElement::column(1, DataType::String, ComponentType::What)
                .required(false)
                .into(),
        ];
        let outcome = attempt(&elements, &row(&["a"]), &ExtractionContext::empty());
        assert!(matches!(outcome, Attempt::Rejected(reason) if reason.contains("degenerate")));
    }

    #[test]
    fn test_fallback_starts_from_empty_accumulator() {
        let mapping = Mapping::new(
            Action::named("a"),
            vec![strict(0, ComponentType::Who), strict(2, ComponentType::What)],
        )
        .fallback(vec![
            strict(1, ComponentType::Where),
            FixedElement::new(Value::from("unknown"), ComponentType::What).into(),
        ]);

        let (pass, acc) = evaluate(&mapping, &row(&["a", "b"]), &ExtractionContext::empty()).unwrap();
        assert_eq!(pass, Pass::Fallback);
        assert_eq!(acc.components(), &[ComponentType::Where, ComponentType::What]);
        assert_eq!(acc.values(), &[Value::from("b"), Value::from("unknown")]);
    }

    #[test]
    fn test_run_memoizes_and_flushes() {
        let mut service = MemoryService::new();
        let mapping = Mapping::new(
            Action::named("a"),
            vec![strict(0, ComponentType::Who), strict(1, ComponentType::What)],
        )
        .batch_size(2);

        let mut run = MappingRun::start(&mut service, &mapping).unwrap();
        let rows = vec![row(&["1", "x"]), row(&["2"]), row(&["3", "y"]), row(&["4", "z"])];
        run.walk(rows, &ExtractionContext::empty()).unwrap();
        let summary = run.finish().unwrap();

        assert_eq!(summary.records, 4);
        assert_eq!(summary.accepted_primary, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.topologies_created, 1);
        assert_eq!(summary.batches_pushed, 2);
        assert_eq!(service.calls().batch_sizes, vec![2, 1]);
        assert_eq!(service.calls().create_labels, 1);
    }
}
