//! Integration tests for launcher pod rendering
//!
//! VirtualMachines are read from YAML the way users write them, rendered, and
//! checked in the JSON shape the API server would receive.

use serde_json::{json, Value};
use virt_controller::crd::VirtualMachine;
use virt_controller::{Error, TemplateConfig, TemplateService};

fn service() -> TemplateService {
    let config = TemplateConfig::from_yaml(
        r#"
launcherImage: kubevirt/virt-launcher
shareDir: /var/run/kubevirt
imagePullSecret: pull-secret-1
"#,
    )
    .unwrap();
    TemplateService::new(config).unwrap()
}

fn render(yaml: &str) -> Value {
    let vm: VirtualMachine = serde_yaml::from_str(yaml).unwrap();
    let pod = service().render_launch_manifest(&vm).unwrap();
    serde_json::to_value(&pod).unwrap()
}

#[test]
fn minimal_vm_renders_minimal_pod() {
    let pod = render(
        r#"
apiVersion: kubevirt.io/v1alpha1
kind: VirtualMachine
metadata:
  name: testvm
  namespace: testns
  uid: "1234"
spec:
  domain: {}
"#,
    );

    assert_eq!(pod["apiVersion"], "v1");
    assert_eq!(pod["kind"], "Pod");
    assert_eq!(pod["metadata"]["generateName"], "virt-launcher-testvm-");
    assert_eq!(
        pod["metadata"]["labels"],
        json!({"kubevirt.io": "virt-launcher", "kubevirt.io/domain": "testvm"})
    );
    assert_eq!(
        pod["metadata"]["annotations"],
        json!({"kubevirt.io/created-by": "1234", "kubevirt.io/owned-by": "virt-controller"})
    );

    let spec = &pod["spec"];
    assert_eq!(spec["nodeSelector"], json!({"kubevirt.io/schedulable": "true"}));
    assert_eq!(spec["terminationGracePeriodSeconds"], 60);
    assert_eq!(spec["restartPolicy"], "Never");
    assert_eq!(spec["hostname"], "testvm");
    assert_eq!(spec["imagePullSecrets"], json!([{"name": "pull-secret-1"}]));

    // Unset placement and resources are omitted, not null
    let spec = spec.as_object().unwrap();
    assert!(!spec.contains_key("affinity"));
    assert!(!spec.contains_key("subdomain"));
    let container = pod["spec"]["containers"][0].as_object().unwrap();
    assert!(!container.contains_key("resources"));
    assert_eq!(container["name"], "compute");
    assert_eq!(container["command"].as_array().unwrap().len(), 13);
    assert_eq!(container["securityContext"], json!({"privileged": true}));

    assert_eq!(
        pod["spec"]["volumes"][0],
        json!({"name": "virt-share-dir", "hostPath": {"path": "/var/run/kubevirt"}})
    );
    assert_eq!(
        pod["spec"]["containers"][0]["volumeMounts"][0],
        json!({"name": "virt-share-dir", "mountPath": "/var/run/kubevirt"})
    );
}

#[test]
fn full_vm_renders_resources_volumes_and_sidecars() {
    let pod = render(
        r#"
apiVersion: kubevirt.io/v1alpha1
kind: VirtualMachine
metadata:
  name: testvm
  namespace: default
  uid: abc-123
  labels:
    app: web
spec:
  hostname: myhost
  subdomain: mydomain
  nodeSelector:
    kubernetes.io/hostname: master
  affinity:
    nodeAffinity:
      requiredDuringSchedulingIgnoredDuringExecution:
        nodeSelectorTerms:
          - matchExpressions:
              - key: cpu
                operator: In
                values: ["unknown"]
  domain:
    resources:
      requests:
        cpu: 1m
        memory: 1G
      limits:
        cpu: 2m
        memory: 2G
  volumes:
    - name: root
      registryDisk:
        image: kubevirt/cirros-registry-disk-demo
        imagePullSecret: pull-secret-2
    - name: data
      persistentVolumeClaim:
        claimName: nfs-pvc
    - name: scratch
      emptyDisk:
        capacity: 2Gi
"#,
    );

    assert_eq!(pod["metadata"]["labels"]["app"], "web");
    assert_eq!(pod["spec"]["hostname"], "myhost");
    assert_eq!(pod["spec"]["subdomain"], "mydomain");
    assert_eq!(
        pod["spec"]["nodeSelector"],
        json!({"kubernetes.io/hostname": "master", "kubevirt.io/schedulable": "true"})
    );
    assert_eq!(
        pod["spec"]["affinity"]["nodeAffinity"]["requiredDuringSchedulingIgnoredDuringExecution"]
            ["nodeSelectorTerms"][0]["matchExpressions"][0]["key"],
        "cpu"
    );

    let compute = &pod["spec"]["containers"][0];
    assert_eq!(
        compute["resources"],
        json!({
            "requests": {"cpu": "1m", "memory": "1099507557"},
            "limits": {"cpu": "2m", "memory": "2099507557"},
        })
    );

    let volume_names: Vec<_> = pod["spec"]["volumes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        volume_names,
        vec!["root", "data", "scratch", "virt-share-dir", "libvirt-runtime"]
    );
    assert_eq!(
        pod["spec"]["volumes"][1]["persistentVolumeClaim"],
        json!({"claimName": "nfs-pvc"})
    );
    assert_eq!(pod["spec"]["volumes"][2]["emptyDir"], json!({"sizeLimit": "2Gi"}));

    let sidecar = &pod["spec"]["containers"][1];
    assert_eq!(sidecar["name"], "volumeroot");
    assert_eq!(sidecar["image"], "kubevirt/cirros-registry-disk-demo");
    assert_eq!(
        sidecar["env"],
        json!([{"name": "COPY_PATH", "value": "/disk/disk-image"}])
    );

    assert_eq!(
        pod["spec"]["imagePullSecrets"],
        json!([{"name": "pull-secret-2"}, {"name": "pull-secret-1"}])
    );
}

#[test]
fn vm_without_namespace_is_rejected() {
    let vm: VirtualMachine = serde_yaml::from_str(
        r#"
apiVersion: kubevirt.io/v1alpha1
kind: VirtualMachine
metadata:
  name: testvm
spec:
  domain: {}
"#,
    )
    .unwrap();

    let err = service().render_launch_manifest(&vm).unwrap_err();
    assert!(matches!(err, Error::MissingField(_)));
    assert!(err.is_malformed_input());
}
