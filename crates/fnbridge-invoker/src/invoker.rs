//! The RPC function invoker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use fnbridge_core::{FunctionDescriptor, RETURN_BINDING_NAME};
use fnbridge_rpc::{InvocationRequest, InvocationTransport, TraceSink, TracingSink};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::binding::{Binder, Binding};
use crate::context::InvocationContext;
use crate::error::{InvokerError, InvokerResult};
use crate::inputs::resolve_inputs;
use crate::outputs::apply_outputs;
use crate::trigger::TriggerInput;

/// Invokes one function on the out-of-process worker.
///
/// Holds the function's descriptor, one [`Binding`] per non-trigger binding
/// name, and a shared transport.
pub struct RpcFunctionInvoker {
    descriptor: FunctionDescriptor,
    bindings: HashMap<String, Arc<dyn Binding>>,
    transport: Arc<dyn InvocationTransport>,
    return_key: String,
}

impl std::fmt::Debug for RpcFunctionInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcFunctionInvoker")
            .field("function", &self.descriptor.name())
            .field("bindings", &self.bindings.len())
            .field("return_key", &self.return_key)
            .finish()
    }
}

impl RpcFunctionInvoker {
    /// Create an invoker. Fails if a non-trigger binding has no
    /// implementation in `bindings`.
    pub fn new(
        descriptor: FunctionDescriptor,
        bindings: HashMap<String, Arc<dyn Binding>>,
        transport: Arc<dyn InvocationTransport>,
    ) -> InvokerResult<Self> {
        let required = descriptor
            .non_trigger_inputs()
            .chain(descriptor.outputs().iter());
        for metadata in required {
            if !bindings.contains_key(&metadata.name) {
                return Err(InvokerError::MissingBinding {
                    function: descriptor.name().to_string(),
                    binding: metadata.name.clone(),
                });
            }
        }
        Ok(Self {
            descriptor,
            bindings,
            transport,
            return_key: RETURN_BINDING_NAME.to_string(),
        })
    }

    /// Builder method: set the result key that carries the return value.
    pub fn with_return_key(self, return_key: &str) -> Self {
        Self {
            return_key: return_key.to_string(),
            ..self
        }
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Invoke with a fresh invocation id, routing worker logs to `tracing`.
    pub async fn invoke(
        &self,
        input: TriggerInput,
        binder: &Binder,
    ) -> InvokerResult<InvocationContext> {
        let invocation_id = Uuid::new_v4();
        let sink = Arc::new(TracingSink::new(
            &invocation_id.to_string(),
            self.descriptor.name(),
        ));
        self.invoke_with(invocation_id, input, binder, sink).await
    }

    /// Run the full pipeline: build the context, bind inputs, call the
    /// worker, apply outputs. Returns the final context.
    pub async fn invoke_with(
        &self,
        invocation_id: Uuid,
        input: TriggerInput,
        binder: &Binder,
        sink: Arc<dyn TraceSink>,
    ) -> InvokerResult<InvocationContext> {
        let function = self.descriptor.name();
        let started = Instant::now();
        info!(%function, %invocation_id, "invoking function");

        let outcome = async {
            let mut context =
                InvocationContext::build(self.descriptor.trigger(), invocation_id, input, binder);
            resolve_inputs(&self.descriptor, &self.bindings, binder, &mut context).await?;

            let request = self.build_request(&context);
            debug!(%invocation_id, inputs = request.input.len(), "sending invocation");
            let result = self.transport.send_invocation(request, sink).await?;

            apply_outputs(
                &self.descriptor,
                &self.bindings,
                binder,
                &mut context,
                &result,
                &self.return_key,
            )
            .await?;
            Ok::<_, InvokerError>(context)
        }
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(%function, %invocation_id, elapsed_ms, "function completed"),
            Err(e) => warn!(%function, %invocation_id, elapsed_ms, error = %e, "function failed"),
        }
        outcome
    }

    /// Encode every bound value into the request payload map. Null values
    /// are omitted.
    fn build_request(&self, context: &InvocationContext) -> InvocationRequest {
        let mut request =
            InvocationRequest::new(&context.invocation_id.to_string(), self.descriptor.name());
        for (name, value) in &context.bindings {
            if let Some(payload) = value.to_wire_bytes() {
                request.input.insert(name.clone(), payload);
            }
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fnbridge_core::{BindingMetadata, BindingValue, Direction};
    use fnbridge_rpc::{InvocationResult, LogLevel, RpcError, RpcResult};
    use serde_json::json;

    use crate::binding::BindingContext;

    /// Records requests and answers with a canned result.
    struct StubTransport {
        reply: Mutex<Option<RpcResult<InvocationResult>>>,
        requests: Mutex<Vec<InvocationRequest>>,
    }

    impl StubTransport {
        fn replying(result: RpcResult<InvocationResult>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(result)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InvocationTransport for StubTransport {
        async fn send_invocation(
            &self,
            request: InvocationRequest,
            sink: Arc<dyn TraceSink>,
        ) -> RpcResult<InvocationResult> {
            sink.write(LogLevel::Info, "worker says hi");
            self.requests.lock().unwrap().push(request);
            self.reply.lock().unwrap().take().unwrap_or(Err(RpcError::Closed))
        }
    }

    struct Constant(BindingValue);

    #[async_trait]
    impl Binding for Constant {
        async fn bind_input(&self, _context: &BindingContext<'_>) -> anyhow::Result<BindingValue> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<BindingValue>>);

    #[async_trait]
    impl Binding for Collect {
        async fn bind_output(&self, context: &BindingContext<'_>) -> anyhow::Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(context.value.cloned().unwrap_or_default());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl TraceSink for Lines {
        fn write(&self, _level: LogLevel, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor::new(
            "Greeter",
            vec![
                BindingMetadata::new("msg", "queueTrigger", Direction::In).trigger(),
                BindingMetadata::new("settings", "blob", Direction::In),
            ],
            vec![BindingMetadata::new("res", "http", Direction::Out).returning()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_pipeline() {
        let transport = StubTransport::replying(Ok(InvocationResult::new("")
            .with_output("$return", "hello ada")
            .with_output("other", "dropped")));
        let res = Arc::new(Collect::default());
        let mut bindings: HashMap<String, Arc<dyn Binding>> = HashMap::new();
        bindings.insert(
            "settings".to_string(),
            Arc::new(Constant(r#"{"greeting":"hello"}"#.into())),
        );
        bindings.insert("res".to_string(), res.clone());
        let invoker = RpcFunctionInvoker::new(descriptor(), bindings, transport.clone()).unwrap();

        let sink = Arc::new(Lines::default());
        let id = Uuid::new_v4();
        let context = invoker
            .invoke_with(
                id,
                TriggerInput::Value(r#"{"name":"ada"}"#.into()),
                &Binder::new(),
                sink.clone(),
            )
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.invocation_id, id.to_string());
        assert_eq!(request.function_name, "Greeter");
        assert_eq!(
            request.input.get("msg").map(Vec::as_slice),
            Some(&br#"{"name":"ada"}"#[..])
        );
        assert_eq!(
            request.input.get("settings").map(Vec::as_slice),
            Some(&br#"{"greeting":"hello"}"#[..])
        );

        assert_eq!(
            context.inputs,
            vec![
                BindingValue::from(json!({ "name": "ada" })),
                BindingValue::from(json!({ "greeting": "hello" })),
            ]
        );
        assert_eq!(*res.0.lock().unwrap(), vec![BindingValue::from("hello ada")]);
        assert!(context.binding("other").is_none());
        assert_eq!(*sink.0.lock().unwrap(), vec!["worker says hi".to_string()]);
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let transport = StubTransport::replying(Err(RpcError::ReplyTimeout(
            std::time::Duration::from_secs(1),
        )));
        let mut bindings: HashMap<String, Arc<dyn Binding>> = HashMap::new();
        bindings.insert("settings".to_string(), Arc::new(Constant(BindingValue::Null)));
        bindings.insert("res".to_string(), Arc::new(Collect::default()));
        let invoker = RpcFunctionInvoker::new(descriptor(), bindings, transport).unwrap();

        let err = invoker
            .invoke(TriggerInput::Value("x".into()), &Binder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokerError::Transport(RpcError::ReplyTimeout(_))));
    }

    #[tokio::test]
    async fn null_inputs_are_not_sent() {
        let transport = StubTransport::replying(Ok(InvocationResult::new("")));
        let mut bindings: HashMap<String, Arc<dyn Binding>> = HashMap::new();
        bindings.insert("settings".to_string(), Arc::new(Constant(BindingValue::Null)));
        bindings.insert("res".to_string(), Arc::new(Collect::default()));
        let invoker = RpcFunctionInvoker::new(descriptor(), bindings, transport.clone()).unwrap();

        invoker
            .invoke(TriggerInput::Value("x".into()), &Binder::new())
            .await
            .unwrap();
        let requests = transport.requests.lock().unwrap();
        assert!(requests[0].input.contains_key("msg"));
        assert!(!requests[0].input.contains_key("settings"));
    }

    #[test]
    fn missing_binding_implementation_is_rejected() {
        let transport = StubTransport::replying(Ok(InvocationResult::new("")));
        let mut bindings: HashMap<String, Arc<dyn Binding>> = HashMap::new();
        bindings.insert("settings".to_string(), Arc::new(Constant(BindingValue::Null)));

        let err = RpcFunctionInvoker::new(descriptor(), bindings, transport).unwrap_err();
        assert!(matches!(err, InvokerError::MissingBinding { ref binding, .. } if binding == "res"));
    }

    #[tokio::test]
    async fn custom_return_key() {
        let transport =
            StubTransport::replying(Ok(InvocationResult::new("").with_output("__ret", "v")));
        let res = Arc::new(Collect::default());
        let mut bindings: HashMap<String, Arc<dyn Binding>> = HashMap::new();
        bindings.insert("settings".to_string(), Arc::new(Constant(BindingValue::Null)));
        bindings.insert("res".to_string(), res.clone());
        let invoker = RpcFunctionInvoker::new(descriptor(), bindings, transport)
            .unwrap()
            .with_return_key("__ret");

        invoker
            .invoke(TriggerInput::Value("x".into()), &Binder::new())
            .await
            .unwrap();
        assert_eq!(*res.0.lock().unwrap(), vec![BindingValue::from("v")]);
    }
}
