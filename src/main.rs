use mate3_bridge::prelude::*;

#[tokio::main]
async fn main() {
    if let Err(err) = mate3_bridge::app().await {
        error!("{:?}", err);
        std::process::exit(1);
    }
}
