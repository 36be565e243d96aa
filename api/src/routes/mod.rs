use actix_web::web::ServiceConfig;

pub mod lnurl;

pub fn configure(config: &mut ServiceConfig) {
    config.service(lnurl::lnurl_pay);
}
