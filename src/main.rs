use std::env;
use std::io::{self, Read, Write};

use rpcmux::{
    auth::AllowAll, config::DispatcherConfig, errors::ProcedureError, logging,
    registry::CONTEXT_PARAM, Method, RpcDispatcher, RpcRequest, RpcValue,
};
use tracing::info;

fn register_samples(dispatcher: &mut RpcDispatcher) -> Result<(), Box<dyn std::error::Error>> {
    dispatcher.register(
        Method::new("add", |call| Ok(RpcValue::Int(call.int(0)? + call.int(1)?)))
            .params(["a", "b"])
            .signature(["int", "int", "int"])
            .doc("Adds two integers"),
    )?;
    dispatcher.register(
        Method::new("echo", |call| Ok(call.arg(0)?.clone()))
            .params(["value"])
            .doc("Returns its argument unchanged"),
    )?;
    dispatcher.register(
        Method::new("divide", |call| {
            let divisor = call.double(1)?;
            if divisor == 0.0 {
                return Err(ProcedureError::fault(2, "division by zero"));
            }
            Ok(RpcValue::Double(call.double(0)? / divisor))
        })
        .params(["dividend", "divisor"])
        .signature(["double", "double", "double"])
        .doc("Divides two numbers"),
    )?;
    dispatcher.register(
        Method::new("whoami", |call| Ok(call.arg(0)?.clone()))
            .params([CONTEXT_PARAM])
            .doc("Returns the caller identity"),
    )?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = DispatcherConfig::from_env()?;
    let mut dispatcher = RpcDispatcher::new(config);
    register_samples(&mut dispatcher)?;

    let content_type = env::args()
        .nth(1)
        .or_else(|| env::var("RPC_CONTENT_TYPE").ok());
    let mut body = Vec::new();
    io::stdin().read_to_end(&mut body)?;

    info!(
        procedures = dispatcher.registry().len(),
        content_type = content_type.as_deref().unwrap_or("unknown"),
        "dispatching request"
    );

    let request = RpcRequest::new(&body, content_type.as_deref());
    let response = dispatcher.handle(&request, &AllowAll)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(response.body.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
