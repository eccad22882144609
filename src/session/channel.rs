use tokio::sync::oneshot;

use crate::driver::{
    CatalogCursor, CatalogRequest, Execution, GeneratedKeys, PreparedInfo, StatementHandle,
    WireValue,
};
use crate::error::SqlMiddlewareDbError;

pub(super) type Reply<T> = oneshot::Sender<Result<T, SqlMiddlewareDbError>>;

pub(super) enum Command {
    Prepare {
        sql: String,
        keys: GeneratedKeys,
        respond_to: Reply<PreparedInfo>,
    },
    Execute {
        handle: StatementHandle,
        params: Vec<WireValue>,
        respond_to: Reply<Execution>,
    },
    FetchNext {
        handle: StatementHandle,
        respond_to: Reply<Option<Vec<WireValue>>>,
    },
    ExecuteBatch {
        handle: StatementHandle,
        batch: Vec<Vec<WireValue>>,
        respond_to: Reply<Vec<u64>>,
    },
    /// `respond_to` is `None` when the close was issued from a destructor.
    CloseStatement {
        handle: StatementHandle,
        respond_to: Option<Reply<()>>,
    },
    SetAutoCommit {
        enabled: bool,
        respond_to: Reply<()>,
    },
    Commit {
        respond_to: Reply<()>,
    },
    Rollback {
        respond_to: Reply<()>,
    },
    CallProgram {
        name: String,
        input: Vec<u8>,
        respond_to: Reply<Vec<u8>>,
    },
    OpenCatalog {
        request: CatalogRequest,
        respond_to: Reply<CatalogCursor>,
    },
    MarkBroken,
    Shutdown,
}
