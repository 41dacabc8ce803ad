use leptos::prelude::*;
use memories_ui::app::App;

fn main() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).expect("logger installed once");
    leptos::mount::mount_to_body(|| view! { <App /> });
}
