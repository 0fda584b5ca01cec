//! Every rule-set the tool evaluates.

use super::{check, RuleSet};
use crate::config::AppConfig;
use crate::mail::SendEmailRequest;
use crate::model::tenant::{
    EmailAuthentication, EmailConfig, EmailServer, ProcessRequest, TrackingAuthentication,
    TrackingConfig,
};
use crate::pipeline::ReportRequest;
use crate::render::ReportModel;

/// `user` and `password` are only demanded when the burndown is captured
/// through a browser sign-in.
pub fn tracking_authentication(custom_burndown: bool) -> RuleSet<TrackingAuthentication> {
    RuleSet::new()
        .field("token", |a: &TrackingAuthentication| {
            check::not_blank(a.token.as_deref())
        })
        .field("user", |a: &TrackingAuthentication| {
            check::not_blank(a.user.as_deref())
        })
        .when(move |_| custom_burndown)
        .field("password", |a: &TrackingAuthentication| {
            check::not_blank(a.password.as_deref())
        })
        .when(move |_| custom_burndown)
}

pub fn tracking_config() -> RuleSet<TrackingConfig> {
    RuleSet::new()
        .field("hasCustomBurndown", |c: &TrackingConfig| {
            check::required(c.has_custom_burndown.as_ref())
        })
        .field("organization", |c: &TrackingConfig| {
            check::not_blank(c.organization.as_deref())
        })
        .field("project", |c: &TrackingConfig| check::not_blank(c.project.as_deref()))
        .field("team", |c: &TrackingConfig| check::not_blank(c.team.as_deref()))
        .nested(
            "authentication",
            |c: &TrackingConfig| c.authentication.as_ref(),
            |c: &TrackingConfig| tracking_authentication(c.custom_burndown()),
        )
}

pub fn email_authentication() -> RuleSet<EmailAuthentication> {
    RuleSet::new().field("user", |a: &EmailAuthentication| {
        check::not_blank(a.user.as_deref())
    })
}

pub fn email_server() -> RuleSet<EmailServer> {
    RuleSet::new()
        .field("host", |s: &EmailServer| check::not_blank(s.host.as_deref()))
        .field("port", |s: &EmailServer| check::required(s.port.as_ref()))
}

pub fn email_config() -> RuleSet<EmailConfig> {
    RuleSet::new()
        .nested(
            "authentication",
            |c: &EmailConfig| c.authentication.as_ref(),
            |_: &EmailConfig| email_authentication(),
        )
        .nested(
            "server",
            |c: &EmailConfig| c.server.as_ref(),
            |_: &EmailConfig| email_server(),
        )
        .each(
            "recipients",
            |c: &EmailConfig| c.recipients.as_deref(),
            |r: &String| check::email_address(r),
        )
        .each_optional(
            "ccRecipients",
            |c: &EmailConfig| c.cc_recipients.as_deref(),
            |r: &String| check::email_address(r),
        )
}

pub fn process_request() -> RuleSet<ProcessRequest> {
    RuleSet::new()
        .nested(
            "tracking",
            |r: &ProcessRequest| r.tracking.as_ref(),
            |_: &ProcessRequest| tracking_config(),
        )
        .nested(
            "email",
            |r: &ProcessRequest| r.email.as_ref(),
            |_: &ProcessRequest| email_config(),
        )
}

pub fn report_request() -> RuleSet<ReportRequest> {
    RuleSet::new()
        .field("hasCustomBurndown", |r: &ReportRequest| {
            check::required(r.has_custom_burndown.as_ref())
        })
        .field("project", |r: &ReportRequest| check::not_blank(Some(r.project.as_str())))
        .field("team", |r: &ReportRequest| check::not_blank(Some(r.team.as_str())))
}

pub fn render_request() -> RuleSet<ReportModel> {
    RuleSet::new()
        .field("backlog", |m: &ReportModel| {
            check::non_empty(&m.backlog, "backlog must have at least one item")
        })
        .field("burndown", |m: &ReportModel| check::not_blank(Some(m.burndown.as_str())))
        .field("iteration.name", |m: &ReportModel| {
            check::not_blank(Some(m.iteration.name.as_str()))
        })
}

pub fn send_email() -> RuleSet<SendEmailRequest> {
    RuleSet::new()
        .nested(
            "email",
            |r: &SendEmailRequest| Some(&r.email),
            |_: &SendEmailRequest| email_config(),
        )
        .field("subject", |r: &SendEmailRequest| check::not_blank(Some(r.subject.as_str())))
        .field("html", |r: &SendEmailRequest| check::not_blank(Some(r.html.as_str())))
}

pub fn app_config() -> RuleSet<AppConfig> {
    RuleSet::new()
        .field("tracking.base_url", |c: &AppConfig| {
            let url = c.tracking.base_url.trim();
            if url.is_empty() {
                Some(super::BLANK.to_string())
            } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                Some(format!("'{url}' is not an http(s) url"))
            } else {
                None
            }
        })
        .field("tracking.api_version", |c: &AppConfig| {
            check::not_blank(Some(c.tracking.api_version.as_str()))
        })
        .field("tracking.chart_width", |c: &AppConfig| {
            (c.tracking.chart_width == 0).then(|| "must be greater than zero".to_string())
        })
        .field("tracking.chart_height", |c: &AppConfig| {
            (c.tracking.chart_height == 0).then(|| "must be greater than zero".to_string())
        })
        .field("browser.webdriver_url", |c: &AppConfig| {
            check::not_blank(Some(c.browser.webdriver_url.as_str()))
        })
        .field("browser.chart_selector", |c: &AppConfig| {
            check::not_blank(Some(c.browser.chart_selector.as_str()))
        })
        .field("logging.level", |c: &AppConfig| {
            check::not_blank(Some(c.logging.level.as_str()))
        })
}
