#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let rocket = geobatch::rocket();
    log::info!("starting geobatch API server");
    rocket
}
