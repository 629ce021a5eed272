//! Batched instance submission.

use crate::loader::error::LoaderError;
use crate::loader::summary::MappingSummary;
use crate::service::{Operation, Service};
use crate::types::{Instance, InstanceBatches};
use std::mem;

/// Accumulates instances and submits them in bounded batches
///
/// A failed push keeps the pending instances so nothing is silently dropped;
/// the caller aborts the run.
#[derive(Debug)]
pub struct BatchPusher {
    batch_size: usize,
    pending: Vec<Instance>,
}

impl BatchPusher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: Vec::new(),
        }
    }

    pub fn queue(&mut self, instance: Instance) {
        self.pending.push(instance);
    }

    pub fn pending(&self) -> &[Instance] {
        &self.pending
    }

    /// Whether the pending count reached the batch size
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// Submit all pending instances as one batch-create call
    pub fn flush(
        &mut self,
        service: &mut dyn Service,
        summary: &mut MappingSummary,
    ) -> Result<(), LoaderError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let count = self.pending.len();
        let batch = InstanceBatches::new(mem::take(&mut self.pending));
        tracing::info!("Pushing batch of {} instances for {}", count, summary.action);

        match service.batch_create_instances(&batch) {
            Ok(true) => {
                summary.batches_pushed += 1;
                summary.instances_pushed += count;
                Ok(())
            }
            Ok(false) => {
                self.pending = batch.into_instances();
                Err(LoaderError::PushFailed {
                    action: summary.action.clone(),
                    count,
                })
            }
            Err(e) => {
                self.pending = batch.into_instances();
                Err(LoaderError::service(&summary.action, Operation::BatchCreate, e))
            }
        }
    }
}
