use keystone_core::AppModule;

use crate::app::controller::HealthController;

pub fn app_module() -> AppModule {
    AppModule::new().controller::<HealthController>()
}
