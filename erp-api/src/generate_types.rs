//! TypeScript type generation module.
//!
//! Exports TypeScript definitions for the request and response bodies of
//! the HTTP API. Runs as a test so the bindings stay in step with the code.

#[cfg(test)]
mod tests {
    use std::{env, path::Path};

    use ts_rs::TS;

    #[test]
    fn generate_typescript_types() {
        // ERP_TS_OUTPUT_DIR wins; otherwise ../ts-bindings.
        let output_dir_str =
            env::var("ERP_TS_OUTPUT_DIR").unwrap_or_else(|_| "../ts-bindings".to_string());
        let output_dir = Path::new(&output_dir_str);

        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir).expect("Failed to create output directory");
        }

        // Drop stale bindings of renamed or removed types.
        for entry in std::fs::read_dir(output_dir).expect("Failed to read output directory") {
            let path = entry.expect("Failed to read directory entry").path();
            if path.extension().and_then(|s| s.to_str()) == Some("ts") {
                std::fs::remove_file(&path)
                    .unwrap_or_else(|e| panic!("Failed to remove {:?}: {}", path, e));
            }
        }

        unsafe {
            env::set_var("TS_RS_EXPORT_DIR", output_dir);
        }

        use crate::api::{
            MessageResponse,
            company::{CompanyView, CreateCompanyRequest},
            device_session::DeviceSessionView,
            settings::{SessionLimitRequest, SessionLimitView},
            status::HealthStatus,
        };
        use crate::auth::ErrorResponse;
        use crate::auth::role_admin::{
            AssignPermissionsRequest, CreateRoleRequest, UpdateRoleRequest,
        };
        use crate::auth::service::{
            ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, MeResponse,
            RefreshRequest, RefreshResponse, RegisterRequest, ResetPasswordRequest, UserProfile,
        };
        use crate::models::{Company, DeviceControl, DeviceSession, Location, Permission, Role};

        Company::export().expect("Failed to export Company type");
        Location::export().expect("Failed to export Location type");
        Role::export().expect("Failed to export Role type");
        Permission::export().expect("Failed to export Permission type");
        DeviceSession::export().expect("Failed to export DeviceSession type");
        DeviceControl::export().expect("Failed to export DeviceControl type");

        ErrorResponse::export().expect("Failed to export ErrorResponse type");
        MessageResponse::export().expect("Failed to export MessageResponse type");

        LoginRequest::export().expect("Failed to export LoginRequest type");
        LoginResponse::export().expect("Failed to export LoginResponse type");
        UserProfile::export().expect("Failed to export UserProfile type");
        RefreshRequest::export().expect("Failed to export RefreshRequest type");
        RefreshResponse::export().expect("Failed to export RefreshResponse type");
        RegisterRequest::export().expect("Failed to export RegisterRequest type");
        ForgotPasswordRequest::export().expect("Failed to export ForgotPasswordRequest type");
        ResetPasswordRequest::export().expect("Failed to export ResetPasswordRequest type");
        ChangePasswordRequest::export().expect("Failed to export ChangePasswordRequest type");
        MeResponse::export().expect("Failed to export MeResponse type");

        CreateCompanyRequest::export().expect("Failed to export CreateCompanyRequest type");
        CompanyView::export().expect("Failed to export CompanyView type");
        DeviceSessionView::export().expect("Failed to export DeviceSessionView type");
        SessionLimitView::export().expect("Failed to export SessionLimitView type");
        SessionLimitRequest::export().expect("Failed to export SessionLimitRequest type");

        CreateRoleRequest::export().expect("Failed to export CreateRoleRequest type");
        UpdateRoleRequest::export().expect("Failed to export UpdateRoleRequest type");
        AssignPermissionsRequest::export().expect("Failed to export AssignPermissionsRequest type");

        HealthStatus::export().expect("Failed to export HealthStatus type");

        println!("TypeScript types generated successfully in {:?}", output_dir);
    }
}
