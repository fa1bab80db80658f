use crate::infra::{load_definitions, ApprovalServices, LoggingNotifier};
use chrono::{Local, NaiveDate};
use clap::Args;
use travel_approvals::config::ApprovalsConfig;
use travel_approvals::error::AppError;
use travel_approvals::workflows::approvals::{
    ActorId, ApprovalError, ApprovalStatusView, ExpenseClaim, PerdiemRequest, SubjectApproval,
    SubjectId, TenantId, TransitionOutcome, TransitionReport, TravelRequest,
};

const DEMO_EVENT_LOG: usize = 64;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Tenant that owns the demo chains (defaults to "demo")
    #[arg(long)]
    pub(crate) tenant: Option<String>,
    /// Print the final approval status of each subject as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let tenant = TenantId(args.tenant.unwrap_or_else(|| "demo".to_string()));
    let config = ApprovalsConfig {
        definitions_csv: None,
        default_tenant: tenant.0.clone(),
    };
    let (definitions, registered) = load_definitions(&config)?;
    let services = ApprovalServices::new(definitions, LoggingNotifier::recording(DEMO_EVENT_LOG));
    let today = Local::now().date_naive();

    println!("Travel approval demo (tenant {tenant})");
    for definition in &registered {
        let chain: Vec<String> = definition
            .steps
            .iter()
            .map(|step| format!("{}. {}", step.step_order, step.approver))
            .collect();
        println!(
            "  {} [{}]: {}",
            definition.name,
            definition.kind.label(),
            chain.join(" -> ")
        );
    }

    println!("\nTravel request: approved in order");
    let travel_id = SubjectId("TR-1001".to_string());
    services.travel.register(TravelRequest {
        id: travel_id.clone(),
        tenant: tenant.clone(),
        requester: ActorId("requester".to_string()),
        destination: "Lisbon".to_string(),
        departure: today + chrono::Duration::days(21),
        return_date: today + chrono::Duration::days(24),
        estimated_cost: 184_000,
        budget_code: Some("BC-4410".to_string()),
        approval: SubjectApproval::default(),
    })?;
    render_view("submitted", &services.travel.initialize(&travel_id)?);
    render_attempt(services.travel.approve(&travel_id, &actor("travel-desk")));
    render_attempt(services.travel.approve(&travel_id, &actor("line-manager")));
    render_attempt(services.travel.approve(&travel_id, &actor("travel-desk")));

    println!("\nTravel request: rejected at the second step, then reset");
    let rejected_id = SubjectId("TR-1002".to_string());
    services.travel.register(TravelRequest {
        id: rejected_id.clone(),
        tenant: tenant.clone(),
        requester: ActorId("requester".to_string()),
        destination: "Singapore".to_string(),
        departure: today + chrono::Duration::days(40),
        return_date: today + chrono::Duration::days(47),
        estimated_cost: 910_000,
        budget_code: Some("BC-4410".to_string()),
        approval: SubjectApproval::default(),
    })?;
    render_view("submitted", &services.travel.initialize(&rejected_id)?);
    render_attempt(services.travel.approve(&rejected_id, &actor("line-manager")));
    render_attempt(services.travel.reject(
        &rejected_id,
        &actor("travel-desk"),
        "budget too high",
    ));
    render_view("rejected", &services.travel.get_status(&rejected_id)?);
    render_view("reset", &services.travel.reset(&rejected_id)?);

    println!("\nExpense claim: final approval blocked until a cost center is recorded");
    let claim_id = SubjectId("EC-2002".to_string());
    services.claims.register(ExpenseClaim {
        id: claim_id.clone(),
        tenant: tenant.clone(),
        claimant: ActorId("requester".to_string()),
        description: "Client dinner".to_string(),
        incurred_on: today,
        amount: 12_750,
        budget_code: Some("BC-4410".to_string()),
        cost_center: None,
        approval: SubjectApproval::default(),
    })?;
    render_view("submitted", &services.claims.initialize(&claim_id)?);
    render_attempt(services.claims.approve(&claim_id, &actor("line-manager")));
    render_attempt(services.claims.approve(&claim_id, &actor("finance-controller")));
    render_attempt(services.claims.reject(
        &claim_id,
        &actor("finance-controller"),
        "Cost center missing; please resubmit",
    ));
    render_view("resubmitted", &services.claims.initialize(&claim_id)?);

    println!("\nPer-diem request: three-step chain");
    let perdiem_id = SubjectId("PD-3003".to_string());
    let start = today + chrono::Duration::days(7);
    let request = PerdiemRequest {
        id: perdiem_id.clone(),
        tenant: tenant.clone(),
        requester: ActorId("requester".to_string()),
        location: "Hamburg".to_string(),
        start_date: start,
        end_date: start + chrono::Duration::days(2),
        daily_rate: 6_500,
        budget_code: Some("BC-5120".to_string()),
        approval: SubjectApproval::default(),
    };
    println!(
        "  {} days at {} = {} (minor units), starting {}",
        request.days(),
        request.daily_rate,
        request.total(),
        format_date(request.start_date)
    );
    services.perdiem.register(request)?;
    render_view("submitted", &services.perdiem.initialize(&perdiem_id)?);
    render_attempt(services.perdiem.approve(&perdiem_id, &actor("line-manager")));
    render_view("reset", &services.perdiem.reset(&perdiem_id)?);
    for approver in ["line-manager", "finance-controller", "treasury"] {
        render_attempt(services.perdiem.approve(&perdiem_id, &actor(approver)));
    }

    let events = services.notifier.events();
    println!("\nNotifications dispatched: {}", events.len());
    for event in &events {
        println!(
            "  {} {} step {} by {}",
            event.kind.name(),
            event.subject_id,
            event.step_order,
            event.actor
        );
    }

    if args.json {
        let views = vec![
            serde_json::to_value(services.travel.get_status(&travel_id)?),
            serde_json::to_value(services.claims.get_status(&claim_id)?),
            serde_json::to_value(services.perdiem.get_status(&perdiem_id)?),
        ];
        for view in views {
            match view.and_then(|value| serde_json::to_string_pretty(&value)) {
                Ok(json) => println!("{json}"),
                Err(err) => println!("  Status payload unavailable: {err}"),
            }
        }
    }

    Ok(())
}

fn actor(handle: &str) -> ActorId {
    ActorId(handle.to_string())
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn render_view(label: &str, view: &ApprovalStatusView) {
    let chain: Vec<String> = view
        .steps
        .iter()
        .map(|step| format!("{}:{}={}", step.step_order, step.approver, step.status_label))
        .collect();
    println!(
        "  {label}: {} is {} [{}]",
        view.subject_id,
        view.status_label,
        chain.join(", ")
    );
}

fn render_attempt(result: Result<TransitionReport, ApprovalError>) {
    match result {
        Ok(report) => {
            let summary = match &report.outcome {
                TransitionOutcome::Advanced {
                    step_order,
                    next_approver,
                    ..
                } => format!("step {step_order} approved; waiting on {next_approver}"),
                TransitionOutcome::Approved { step_order } => {
                    format!("step {step_order} approved; request fully approved")
                }
                TransitionOutcome::Rejected { step_order, reason } => {
                    format!("step {step_order} rejected: {reason}")
                }
            };
            println!("  {summary}");
        }
        Err(err) => println!("  refused ({}): {err}", err.code()),
    }
}
