//! Request exporter.
//!
//! `NdjsonService` answers like [`MemoryService`] (so ids are assigned and
//! topologies deduplicated) and writes each request, with the identities it
//! resolved to, as one NDJSON line. Instances are not kept once their batch
//! line is written.

use crate::serialization::NdjsonWriter;
use crate::service::{MemoryService, Service, ServiceError};
use crate::types::{Action, InstanceBatch, InstanceBatches, Labels, Topology};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    CreateAction { action: &'a Action },
    CreateTopology { topology: &'a Topology },
    CreateLabels { labels: &'a Labels },
    BatchCreateInstances { batches: &'a [InstanceBatch] },
}

/// Service that records every request as NDJSON
pub struct NdjsonService<W: Write> {
    store: MemoryService,
    writer: NdjsonWriter<W>,
}

impl<W: Write> NdjsonService<W> {
    pub fn new(writer: W) -> Self {
        Self {
            store: MemoryService::ids_only(),
            writer: NdjsonWriter::new(writer),
        }
    }

    /// The in-memory state behind the exported requests
    pub fn store(&self) -> &MemoryService {
        &self.store
    }

    /// Number of requests written
    pub fn requests_written(&self) -> usize {
        self.writer.lines_written()
    }

    /// Flush the output and return it together with the store
    pub fn finish(self) -> Result<(MemoryService, W), ServiceError> {
        let writer = self.writer.into_inner()?;
        Ok((self.store, writer))
    }
}

impl<W: Write> Service for NdjsonService<W> {
    fn create_action(&mut self, action: &Action) -> Result<Action, ServiceError> {
        let created = self.store.create_action(action)?;
        self.writer.write(&Request::CreateAction { action: &created })?;
        Ok(created)
    }

    fn create_topology(&mut self, topology: &Topology) -> Result<Topology, ServiceError> {
        let created = self.store.create_topology(topology)?;
        self.writer.write(&Request::CreateTopology {
            topology: &created,
        })?;
        Ok(created)
    }

    fn create_labels(&mut self, labels: &Labels) -> Result<bool, ServiceError> {
        let ok = self.store.create_labels(labels)?;
        self.writer.write(&Request::CreateLabels { labels })?;
        Ok(ok)
    }

    fn batch_create_instances(&mut self, batches: &InstanceBatches) -> Result<bool, ServiceError> {
        let grouped = batches.batches()?;
        let ok = self.store.batch_create_instances(batches)?;
        self.writer.write(&Request::BatchCreateInstances { batches: &grouped })?;
        Ok(ok)
    }
}
