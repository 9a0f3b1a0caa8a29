use gridlink_common::ClientResponse;

/// Whatever a completion handler throws. Callback failures are caught by the
/// client and routed to [`StatusListener::uncaught_error`], never back into
/// the reactor.
///
/// [`StatusListener::uncaught_error`]: crate::StatusListener::uncaught_error
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Completion handler for one procedure invocation.
///
/// Invoked exactly once per successfully queued invocation, on the reactor's
/// delivery thread, and never while the client holds an internal lock. It
/// is safe to call back into the [`Distributor`](crate::Distributor) from
/// here.
pub trait ProcedureCallback: Send + Sync {
    fn client_callback(&self, response: &ClientResponse) -> Result<(), CallbackError>;
}

impl<F> ProcedureCallback for F
where
    F: Fn(&ClientResponse) -> Result<(), CallbackError> + Send + Sync,
{
    fn client_callback(&self, response: &ClientResponse) -> Result<(), CallbackError> {
        self(response)
    }
}

impl<T: ProcedureCallback + ?Sized> ProcedureCallback for std::sync::Arc<T> {
    fn client_callback(&self, response: &ClientResponse) -> Result<(), CallbackError> {
        (**self).client_callback(response)
    }
}
