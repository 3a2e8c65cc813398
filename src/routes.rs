use actix_web::web;

use crate::errors;
use crate::handlers::{assignment, auth, department, permission, role, user};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(errors::json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(errors::query_error_handler))
        .app_data(web::PathConfig::default().error_handler(errors::path_error_handler))
        .service(web::resource("/v1/auth/login/").route(web::post().to(auth::login)))
        .service(
            web::scope("/v1/departments")
                .service(web::resource("/").route(web::get().to(department::list_departments)))
                .service(
                    web::resource("/parents/")
                        .route(web::get().to(department::list_parent_departments)),
                )
                .service(web::resource("/tree/").route(web::get().to(department::department_tree)))
                .service(
                    web::resource("/children/")
                        .route(web::get().to(department::list_child_departments)),
                )
                .service(
                    web::resource("/children/{parent_id}/")
                        .route(web::get().to(department::list_children_by_parent)),
                )
                .service(
                    web::resource("/create/").route(web::post().to(department::create_department)),
                )
                .service(
                    web::resource("/update/{id}/")
                        .route(web::put().to(department::update_department))
                        .route(web::patch().to(department::update_department)),
                )
                .service(
                    web::resource("/delete/{id}/")
                        .route(web::delete().to(department::delete_department)),
                )
                .service(web::resource("/{id}/").route(web::get().to(department::get_department))),
        )
        .service(
            web::scope("/v1/users")
                .service(web::resource("/register/").route(web::post().to(user::register)))
                .service(web::resource("/profile/").route(web::get().to(user::get_profile)))
                .service(web::resource("/list/").route(web::get().to(user::list_users)))
                .service(
                    web::resource("/update/")
                        .route(web::put().to(user::update_self))
                        .route(web::patch().to(user::update_self)),
                )
                .service(
                    web::resource("/update/{id}/")
                        .route(web::put().to(user::update_user))
                        .route(web::patch().to(user::update_user)),
                )
                .service(web::resource("/delete/").route(web::delete().to(user::delete_self)))
                .service(web::resource("/delete/{id}/").route(web::delete().to(user::delete_user)))
                .service(
                    web::resource("/assign-role/").route(web::post().to(assignment::assign_role)),
                )
                .service(
                    web::resource("/user-roles/{user_id}/")
                        .route(web::get().to(assignment::user_roles)),
                )
                .service(
                    web::resource("/assign-user-permissions/")
                        .route(web::post().to(assignment::assign_user_permissions)),
                )
                .service(
                    web::resource("/remove-user-permissions/")
                        .route(web::post().to(assignment::remove_user_permissions)),
                )
                .service(
                    web::resource("/roles/")
                        .route(web::get().to(role::list_roles))
                        .route(web::post().to(role::create_role)),
                )
                .service(
                    web::resource("/roles/{id}/")
                        .route(web::get().to(role::get_role))
                        .route(web::put().to(role::update_role))
                        .route(web::patch().to(role::update_role))
                        .route(web::delete().to(role::delete_role)),
                )
                .service(
                    web::resource("/permissions/").route(web::get().to(permission::list_permissions)),
                )
                .service(
                    web::resource("/permissions/{id}/")
                        .route(web::get().to(permission::get_permission)),
                )
                .service(
                    web::resource("/{id}/permissions/").route(web::get().to(user::user_permissions)),
                )
                .service(web::resource("/{id}/").route(web::get().to(user::get_user))),
        );
}
