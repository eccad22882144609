//! Remote program calls with fixed-layout parameter records.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::SqlMiddlewareDbError;
use crate::executor::Record;
use crate::pool::DriverPool;
use crate::session::Session;

pub mod codec;
mod mock;

pub(crate) use mock::MockRegistry;
pub use mock::ProgramHandler;

/// Field name to value, for both the input and the output of a program call.
pub type ProgramRecord = Record;

/// One field of a program's parameter record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramField {
    pub name: String,
    pub byte_size: usize,
    /// Implied decimal places of a numeric field; `None` for character fields
    #[serde(default)]
    pub decimal_count: Option<u32>,
}

impl ProgramField {
    #[must_use]
    pub fn text(name: impl Into<String>, byte_size: usize) -> Self {
        Self {
            name: name.into(),
            byte_size,
            decimal_count: None,
        }
    }

    #[must_use]
    pub fn decimal(name: impl Into<String>, byte_size: usize, decimal_count: u32) -> Self {
        Self {
            name: name.into(),
            byte_size,
            decimal_count: Some(decimal_count),
        }
    }
}

/// Ordered layout of a program's parameter record. Input and output share it.
///
/// Deserializes from `{"programName": "...", "fields": [{"name", "byteSize", "decimalCount"}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSchema {
    pub program_name: String,
    pub fields: Vec<ProgramField>,
}

impl ProgramSchema {
    #[must_use]
    pub fn new(program_name: impl Into<String>, fields: Vec<ProgramField>) -> Self {
        Self {
            program_name: program_name.into(),
            fields,
        }
    }

    /// Total size of the packed record.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.fields.iter().map(|f| f.byte_size).sum()
    }
}

/// A callable remote program, produced by [`crate::Client::define_program`].
#[derive(Clone)]
pub struct Program {
    schema: Arc<ProgramSchema>,
    pool: DriverPool,
    mocks: MockRegistry,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Program {
    pub(crate) fn new(
        schema: ProgramSchema,
        pool: DriverPool,
        mocks: MockRegistry,
    ) -> Result<Self, SqlMiddlewareDbError> {
        codec::validate(&schema)?;
        Ok(Self {
            schema: Arc::new(schema),
            pool,
            mocks,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.program_name
    }

    #[must_use]
    pub fn schema(&self) -> &ProgramSchema {
        &self.schema
    }

    /// Call the program. A mock registered under the program's name answers instead of the
    /// remote engine; the registry is consulted on every call.
    ///
    /// # Errors
    /// Returns a `Programming` error if `input` does not fit the layout or the result buffer does
    /// not match it, and the driver's error if the call fails. Both carry `CALL <name>` and the
    /// input values as context.
    pub async fn call(&self, input: &ProgramRecord) -> Result<ProgramRecord, SqlMiddlewareDbError> {
        let name = self.name();
        if let Some(mock) = self.mocks.lookup(name) {
            tracing::debug!(program = name, "calling mocked program");
            return Ok(mock(input));
        }

        let context = |e: SqlMiddlewareDbError| {
            e.with_context(&format!("CALL {name}"), &[input.values().cloned().collect()])
        };
        let packed = codec::pack(&self.schema, input).map_err(context)?;
        let session = Session::acquire(&self.pool).await?;
        tracing::debug!(session = session.id(), program = name, bytes = packed.len(), "calling program");
        let output = session.call_program(name, packed).await.map_err(context)?;
        codec::unpack(&self.schema, &output).map_err(context)
    }
}
