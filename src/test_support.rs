use anyhow::Result;
use axum::Router;

pub const SENSORS_BODY: &str = r#"{
    "api_version" : "V1.0.11-0.0.40",
    "time_stamp" : 1664170828,
    "data_time_stamp" : 1664170800,
    "location_type" : 0,
    "max_age" : 604800,
    "firmware_default_version" : "7.00",
    "fields" : ["sensor_index","humidity","temperature","voc","pm1.0","pm2.5","pm10.0"],
    "data" : [
      [15111,43,77,null,6.2,8.7,9.4],
      [20755,55,69,null,7.3,9.9,10.3],
      [90011,47,72,null,7.1,10.3,11.0],
      [127397,51,69,null,4.1,7.3,7.8]
    ]
}"#;

/// Serves `app` on an ephemeral localhost port and returns its base URL.
pub async fn serve(app: Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}"))
}
