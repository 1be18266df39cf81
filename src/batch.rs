//! Concurrent request fan-out.
//!
//! A batch takes a finite job list or a streaming source of [`JobUrl`]
//! values, fans them out to a worker pool gated by an optional rate
//! limiter, and returns two channels: results and errors. Every job
//! produces exactly one message on exactly one channel, and both channels
//! close once all workers finish. One failing job never affects the rest
//! of the pool.
//!
//! Workers stop when the job source closes; a cancelled context aborts
//! in-flight requests through per-request propagation, so callers driving
//! cancellation should also close their streaming source.

use std::any::Any;
use std::sync::Arc;

use http::Method;

use crate::client::Client;
use crate::context::Context;
use crate::cookies::Cookie;
use crate::error::Error;
use crate::payload::Payload;
use crate::ratelimit::RateLimiter;
use crate::response::Response;

/// Default worker pool size.
pub const DEFAULT_POOL: usize = 10;

/// One queued unit of work: a URL with per-job overrides.
pub struct JobUrl {
    url: String,
    tag: Option<Arc<dyn Any + Send + Sync>>,
    payload: Payload,
    set_headers: Vec<(String, String)>,
    add_headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
}

impl JobUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tag: None,
            payload: Payload::Empty,
            set_headers: Vec::new(),
            add_headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Attach an opaque context object, echoed back on the result.
    pub fn tag(mut self, tag: impl Any + Send + Sync) -> Self {
        self.tag = Some(Arc::new(tag));
        self
    }

    /// Body for this job.
    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Headers replacing same-named request headers.
    pub fn set_headers<K: Into<String>, V: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.set_headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Headers appended to the request.
    pub fn add_headers<K: Into<String>, V: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.add_headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Extra cookies for this job.
    pub fn add_cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }
}

impl From<&str> for JobUrl {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for JobUrl {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&String> for JobUrl {
    fn from(url: &String) -> Self {
        Self::new(url.clone())
    }
}

/// A completed batch job: the response plus the job's tag.
pub struct BatchResponse {
    pub response: Response,
    tag: Option<Arc<dyn Any + Send + Sync>>,
}

impl BatchResponse {
    /// The job's opaque context object, if one was attached.
    pub fn tag(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.tag.as_deref()
    }

    /// The tag downcast to a concrete type.
    pub fn tag_as<T: Any>(&self) -> Option<&T> {
        self.tag.as_deref()?.downcast_ref()
    }
}

/// Where batch jobs come from.
enum JobSource {
    List(Vec<JobUrl>),
    Stream(async_channel::Receiver<JobUrl>),
}

/// Builder for a concurrent request run.
pub struct Batch {
    client: Client,
    method: Method,
    source: JobSource,
    pool: usize,
    limiter: RateLimiter,
    context: Option<Context>,
}

impl Client {
    /// Start a concurrent batch over this client. Workers share the
    /// client's pools, DNS cache, and cookie jar.
    pub fn batch(&self) -> Batch {
        Batch {
            client: self.clone(),
            method: Method::GET,
            source: JobSource::List(Vec::new()),
            pool: DEFAULT_POOL,
            limiter: RateLimiter::Unlimited,
            context: None,
        }
    }
}

impl Batch {
    /// GET every job in the list.
    pub fn get(mut self, jobs: impl IntoIterator<Item = impl Into<JobUrl>>) -> Self {
        self.method = Method::GET;
        self.source = JobSource::List(jobs.into_iter().map(Into::into).collect());
        self
    }

    /// POST every job in the list (bodies come from each job's payload).
    pub fn post(mut self, jobs: impl IntoIterator<Item = impl Into<JobUrl>>) -> Self {
        self.method = Method::POST;
        self.source = JobSource::List(jobs.into_iter().map(Into::into).collect());
        self
    }

    /// Consume jobs from a channel; workers exit when it closes.
    pub fn source(mut self, jobs: async_channel::Receiver<JobUrl>) -> Self {
        self.source = JobSource::Stream(jobs);
        self
    }

    /// Request method for streamed jobs.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Worker pool size (default 10). On unix the effective size is capped
    /// at 70% of the file-descriptor soft limit.
    pub fn pool(mut self, workers: usize) -> Self {
        self.pool = workers;
        self
    }

    /// Limit the pool to `max_per_second` request starts per second.
    pub fn rate_limit(mut self, max_per_second: u32) -> Self {
        self.limiter = RateLimiter::per_second(max_per_second);
        self
    }

    /// Context propagated into every request of the run.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Spawn the workers.
    ///
    /// Returns the results and errors channels. Read both until they close;
    /// cancelling the context does not drain the workers by itself.
    pub fn run(
        self,
    ) -> (
        async_channel::Receiver<BatchResponse>,
        async_channel::Receiver<Error>,
    ) {
        let Self {
            client,
            method,
            source,
            pool,
            limiter,
            context,
        } = self;

        let workers = effective_pool(pool);
        let limiter = Arc::new(limiter);
        let client = Arc::new(client);

        let job_rx = match source {
            JobSource::Stream(rx) => rx,
            JobSource::List(jobs) => {
                let (tx, rx) = async_channel::unbounded();
                for job in jobs {
                    let _ = tx.try_send(job);
                }
                rx
            }
        };

        let (result_tx, result_rx) = async_channel::unbounded();
        let (error_tx, error_rx) = async_channel::unbounded();

        tracing::debug!(workers, "starting batch run");

        for _ in 0..workers {
            let client = Arc::clone(&client);
            let limiter = Arc::clone(&limiter);
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();
            let method = method.clone();
            let context = context.clone();

            tokio::spawn(async move {
                while let Ok(job) = job_rx.recv().await {
                    limiter.take().await;

                    let JobUrl {
                        url,
                        tag,
                        payload,
                        set_headers,
                        add_headers,
                        cookies,
                    } = job;

                    let mut request = client
                        .request(method.clone(), &url, payload)
                        .set_headers(set_headers)
                        .add_headers(add_headers)
                        .add_cookies(cookies);
                    if let Some(ctx) = &context {
                        request = request.with_context(ctx.clone());
                    }

                    match request.send().await {
                        Ok(response) => {
                            let _ = result_tx.send(BatchResponse { response, tag }).await;
                        }
                        Err(error) => {
                            let _ = error_tx.send(error).await;
                        }
                    }
                }
            });
        }

        // Workers hold the only remaining senders; both channels close
        // when the last worker exits.
        (result_rx, error_rx)
    }
}

/// Resolve the worker count, applying the fd-limit cap on unix.
fn effective_pool(requested: usize) -> usize {
    let workers = if requested == 0 { DEFAULT_POOL } else { requested };

    #[cfg(unix)]
    {
        let mut limit: libc::rlimit = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
        if ret == 0 && workers as u64 > limit.rlim_cur as u64 {
            return (limit.rlim_cur as f64 * 0.7) as usize;
        }
    }

    workers
}
