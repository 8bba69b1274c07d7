//! Blob-triggered sample: copies `input/{name}` to `output/{name}`.

use fnhost_engine::{FunctionDescriptor, HandlerError, HandlerOutput, handler_fn};
use fnhost_types::{BindingDecl, DataShape, TriggerBinding};

pub const BLOB_TRIGGER_TO_BLOB: &str = "BlobTriggerToBlobTest";

pub fn blob_trigger_to_blob() -> FunctionDescriptor {
    FunctionDescriptor::new(
        BLOB_TRIGGER_TO_BLOB,
        TriggerBinding::blob("input/{name}", DataShape::Binary),
        handler_fn(|args, outputs, context| {
            let name = args.route_param("name").unwrap_or_default();
            context.logger().info(format!(
                "Blob trigger function {BLOB_TRIGGER_TO_BLOB} processed a blob. Name: {name} Size: {} Bytes",
                args.trigger.len()
            ));
            let input = args
                .input("inputBlob")
                .cloned()
                .ok_or_else(|| HandlerError::permanent("inputBlob was not resolved"))?;
            outputs.set("outputBlob", input)?;
            Ok(HandlerOutput::none())
        }),
    )
    .with_trigger_name("triggerBlob")
    .with_input(BindingDecl::input("inputBlob", "input/{name}", DataShape::Binary))
    .with_output(BindingDecl::output("outputBlob", "output/{name}", DataShape::Binary))
}
