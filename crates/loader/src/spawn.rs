use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("lode-loader")
			.build()
			.expect("failed to build lode-loader fallback tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns load bookkeeping work on the ambient runtime, falling back to a
/// process-global runtime when called outside of one.
pub(crate) fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!("load.spawn");
	runtime_handle().spawn(fut)
}
