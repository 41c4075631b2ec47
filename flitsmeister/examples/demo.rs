use flitsmeister::FlitsmeisterClient;
use std::env;

#[tokio::main]
async fn main() {
    let username =
        env::var("FLITSMEISTER_USERNAME").expect("FLITSMEISTER_USERNAME environment variable not set");
    let password =
        env::var("FLITSMEISTER_PASSWORD").expect("FLITSMEISTER_PASSWORD environment variable not set");

    let mut client = FlitsmeisterClient::new();
    let auth = match client.login(&username, &password).await {
        Ok(auth) => auth,
        Err(e) => {
            println!("{e:#?}");
            return;
        }
    };
    println!("{auth:#?}");

    client.set_auth(Some(auth));
    match client.user().await {
        Ok(user) => println!("{user:#?}"),
        Err(e) => println!("{e:#?}"),
    }

    match client.statistics().await {
        Ok(stats) => println!("{stats:#?}"),
        Err(e) => println!("{e:#?}"),
    }

    client.close();
}
