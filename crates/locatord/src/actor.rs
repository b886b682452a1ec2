//! Bootstrap services declared in `[[services]]`.
//!
//! Each one is a plain TCP listener: it binds the endpoint the registry
//! allocated, publishes its configured version and method names, and logs
//! connections. It exists so a node has something to advertise and so the
//! cross-thread attach path runs in production.

use std::io;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use locator_core::config::BootstrapService;
use locator_core::{Endpoint, MethodTable};
use locator_services::{Actor, Registry};

pub struct ListenerActor {
    name: String,
    version: u32,
    methods: MethodTable,
    runtime: Handle,
    bound: Option<Endpoint>,
    task: Option<JoinHandle<()>>,
}

impl ListenerActor {
    /// Method ids are assigned by position in `service.methods`.
    pub fn new(service: &BootstrapService, runtime: Handle) -> Self {
        let methods = service
            .methods
            .iter()
            .enumerate()
            .map(|(id, name)| (id as u32, name.clone()))
            .collect();

        Self {
            name: service.name.clone(),
            version: service.version,
            methods,
            runtime,
            bound: None,
            task: None,
        }
    }
}

impl Actor for ListenerActor {
    fn run(&mut self, endpoint: &Endpoint) -> io::Result<()> {
        let listener = std::net::TcpListener::bind((endpoint.host.as_str(), endpoint.port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let _guard = self.runtime.enter();
        let listener = tokio::net::TcpListener::from_std(listener)?;

        let name = self.name.clone();
        self.task = Some(self.runtime.spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((_stream, remote)) => {
                        tracing::debug!(service = %name, %remote, "client connected");
                    }
                    Err(e) => tracing::warn!(service = %name, error = %e, "accept failed"),
                }
            }
        }));
        self.bound = Some(Endpoint::new(endpoint.host.clone(), port));
        Ok(())
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.bound.iter().cloned().collect()
    }

    fn dispatch_map(&self) -> MethodTable {
        self.methods.clone()
    }

    fn dispatch_version(&self) -> u32 {
        self.version
    }

    fn terminate(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.bound = None;
    }
}

/// Attach every bootstrap service. Blocks on the registry lock, so call it
/// from a blocking thread. Returns the names that were attached.
pub fn attach_bootstrap(registry: &Registry, services: &[BootstrapService], runtime: Handle) -> Vec<String> {
    let mut attached = Vec::new();
    for service in services {
        let actor = ListenerActor::new(service, runtime.clone());
        match registry.attach(&service.name, Box::new(actor)) {
            Ok(endpoint) => {
                tracing::info!(service = %service.name, %endpoint, "bootstrap service attached");
                attached.push(service.name.clone());
            }
            Err(e) => tracing::error!(service = %service.name, error = %e, "unable to attach bootstrap service"),
        }
    }
    attached
}

/// Detach services by name, ignoring ones that are already gone.
pub fn detach_all(registry: &Registry, names: &[String]) {
    for name in names {
        if let Err(e) = registry.detach(name) {
            tracing::warn!(service = %name, error = %e, "unable to detach service");
        }
    }
}
